//! Configuration errors.

use courier_core::CourierError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded or was rejected.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("no configuration file at {path}")]
    Missing {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read configuration file {path}")]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The format is neither TOML nor JSON.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Malformed TOML.
    #[error("malformed TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON.
    #[error("malformed JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value the bus cannot use.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field, e.g. `transports.async.dsn`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An override variable could not be parsed.
    #[error("cannot parse environment variable {var}: {reason}")]
    InvalidEnv {
        /// Full variable name, prefix included.
        var: String,
        /// What was expected.
        reason: String,
    },

    /// The sections are individually valid but inconsistent together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// A missing file.
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    /// An unreadable file.
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// A field with an unusable value.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// An unparsable override variable.
    pub fn invalid_env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnv {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Inconsistent sections.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

// Routing table errors surface while validating.
impl From<CourierError> for ConfigError {
    fn from(err: CourierError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl From<ConfigError> for CourierError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::ErrorCategory;

    #[test]
    fn test_missing_names_path() {
        let err = ConfigError::missing("/etc/courier/courier.toml");
        assert_eq!(err.to_string(), "no configuration file at /etc/courier/courier.toml");
    }

    #[test]
    fn test_invalid_env_names_variable() {
        let err = ConfigError::invalid_env("COURIER__WORKER__POLL_INTERVAL_MS", "expected integer");
        let message = err.to_string();
        assert!(message.contains("COURIER__WORKER__POLL_INTERVAL_MS"));
        assert!(message.ends_with("expected integer"));
    }

    #[test]
    fn test_routing_error_becomes_invalid() {
        let err: ConfigError = CourierError::config("message \"Import\" is routed twice").into();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("Import")));
    }

    #[test]
    fn test_converts_to_configuration_category() {
        let err: CourierError = ConfigError::invalid_value("transports.async.dsn", "missing scheme").into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("transports.async.dsn"));
    }
}
