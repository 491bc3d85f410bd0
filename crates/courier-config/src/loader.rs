//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! defaults, files, strings and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use courier_telemetry::LogFormat;

use crate::{ConfigError, CourierConfig, TransportConfig};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file or string (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use courier_config::ConfigLoader;
///
/// # fn main() -> Result<(), courier_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("courier.toml")?
///     .with_env_prefix("COURIER")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: CourierConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CourierConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is what `new()` starts with, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = CourierConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// ```
    /// use courier_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = CourierConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = CourierConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, or
    /// contains invalid TOML/JSON or unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::missing(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::unreadable(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use courier_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [bus]
    ///     name = "command.bus"
    ///
    ///     [transports.async]
    ///     dsn = "nats://localhost:4222?stream=jobs"
    ///
    ///     [[routing]]
    ///     message = "ImportCatalog"
    ///     senders = ["async"]
    /// "#;
    ///
    /// let config = ConfigLoader::new().with_string(toml, "toml").unwrap().load().unwrap();
    /// assert_eq!(config.bus.name, "command.bus");
    /// assert_eq!(config.routing_table().unwrap().senders_for("ImportCatalog").len(), 1);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat(format.to_string()))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `COURIER__BUS__NAME` or `COURIER__TRANSPORTS__ASYNC__DSN`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(err) if err.not_found() => Ok(self),
            Err(err) => Err(ConfigError::invalid(format!("malformed .env file: {err}"))),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an environment variable cannot be parsed or
    /// the final configuration is invalid.
    pub fn load(mut self) -> Result<CourierConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> CourierConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<CourierConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["BUS", "NAME"] => {
                self.config.bus.name = value.to_string();
            }
            ["BUS", "ALLOW_NO_HANDLERS"] => {
                self.config.bus.allow_no_handlers =
                    parse_bool(value).ok_or_else(|| ConfigError::invalid_env(key, "expected boolean"))?;
            }

            ["TRANSPORTS", name, "DSN"] => {
                let existing = self
                    .config
                    .transports
                    .keys()
                    .find(|declared| declared.eq_ignore_ascii_case(name))
                    .cloned();
                match existing {
                    Some(declared) => {
                        if let Some(transport) = self.config.transports.get_mut(&declared) {
                            transport.dsn = value.to_string();
                        }
                    }
                    None => {
                        self.config
                            .transports
                            .insert(name.to_lowercase(), TransportConfig::new(value));
                    }
                }
            }

            ["SECURITY", "DEFAULT_PROVIDER"] => {
                self.config.security.default_provider = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }

            ["WORKER", "POLL_INTERVAL_MS"] => {
                self.config.worker.poll_interval_ms = value
                    .parse()
                    .map_err(|_| ConfigError::invalid_env(key, "expected integer"))?;
            }
            ["WORKER", "RECEIVERS"] => {
                self.config.worker.receivers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled =
                    parse_bool(value).ok_or_else(|| ConfigError::invalid_env(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = value
                    .parse::<LogFormat>()
                    .map_err(|_| ConfigError::invalid_env(key, "expected 'json', 'pretty' or 'compact'"))?;
            }

            _ => {}
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().with_defaults().load().unwrap();
        assert_eq!(config.bus.name, "courier.bus");
        assert_eq!(config.worker.poll_interval_ms, 1000);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{
            "transports": {"natsB": {"dsn": "nats://broker?stream=b"}},
            "routing": [{"message": "Foo", "senders": ["natsB"], "options": {"priority": 2}}]
        }"#;
        let config = ConfigLoader::new().with_string(json, "json").unwrap().load().unwrap();
        assert_eq!(config.transports["natsB"].dsn, "nats://broker?stream=b");
        assert_eq!(config.routing[0].options["priority"], 2);
    }

    #[test]
    fn test_loader_rejects_unknown_field() {
        let toml = r#"
            [bus]
            nmae = "typo"
        "#;
        assert!(matches!(
            ConfigLoader::new().with_string(toml, "toml"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        assert!(ConfigLoader::new().with_string("", "yaml").is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/courier.toml");
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/courier.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.bus.name, "courier.bus");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__BUS__NAME", "event.bus", "TEST").unwrap();
        loader.apply_env_var("TEST__BUS__ALLOW_NO_HANDLERS", "yes", "TEST").unwrap();
        loader.apply_env_var("TEST__SECURITY__DEFAULT_PROVIDER", "main", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "compact", "TEST").unwrap();
        loader.apply_env_var("TEST__WORKER__RECEIVERS", "async, audit", "TEST").unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.bus.name, "event.bus");
        assert!(config.bus.allow_no_handlers);
        assert_eq!(config.security.default_provider.as_deref(), Some("main"));
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.worker.receivers, vec!["async", "audit"]);
    }

    #[test]
    fn test_apply_env_var_transport_dsn() {
        let mut loader = ConfigLoader::new()
            .with_string(r#"{"transports": {"natsB": {"dsn": "nats://old?stream=b"}}}"#, "json")
            .unwrap();
        loader.apply_env_var("TEST__TRANSPORTS__NATSB__DSN", "nats://new?stream=b", "TEST").unwrap();
        loader.apply_env_var("TEST__TRANSPORTS__AUDIT__DSN", "in-memory://", "TEST").unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.transports["natsB"].dsn, "nats://new?stream=b");
        assert_eq!(config.transports["audit"].dsn, "in-memory://");
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__WORKER__POLL_INTERVAL_MS", "soon", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__UNKNOWN__KEY", "x", "TEST").is_ok());
    }
}
