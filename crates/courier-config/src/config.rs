//! Main configuration types.
//!
//! This module provides the top-level [`CourierConfig`] struct.

use courier_core::RoutingTable;
use courier_telemetry::LogConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{BusConfig, ConfigError, RouteConfig, SecurityConfig, TransportConfig, WorkerConfig};

/// Complete Courier configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use courier_config::CourierConfig;
///
/// let config = CourierConfig::default();
/// assert_eq!(config.bus.name, "courier.bus");
/// assert!(config.transports.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Bus configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Named transports, in declaration order.
    #[serde(default)]
    pub transports: IndexMap<String, TransportConfig>,

    /// Message routing.
    #[serde(default)]
    pub routing: Vec<RouteConfig>,

    /// Security configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Worker configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,
}

impl CourierConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - the bus name is empty
    /// - a transport has an empty DSN or a DSN without a scheme
    /// - a message type is routed twice
    /// - a route or the worker names an undeclared transport
    /// - the poll interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.name.trim().is_empty() {
            return Err(ConfigError::invalid_value("bus.name", "must not be empty"));
        }

        for (name, transport) in &self.transports {
            if !transport.dsn.contains("://") {
                return Err(ConfigError::invalid_value(
                    format!("transports.{name}.dsn"),
                    format!("\"{}\" is not a connection string", transport.dsn),
                ));
            }
        }

        self.routing_table()?;

        for receiver in &self.worker.receivers {
            if !self.transports.contains_key(receiver) {
                return Err(ConfigError::invalid_value(
                    "worker.receivers",
                    format!("unknown transport \"{receiver}\""),
                ));
            }
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_value("worker.poll_interval_ms", "must be positive"));
        }

        Ok(())
    }

    /// Build the runtime routing table.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a message type is routed twice or a route
    /// names an undeclared transport.
    pub fn routing_table(&self) -> Result<RoutingTable, ConfigError> {
        let mut builder = RoutingTable::builder();
        for route in &self.routing {
            builder = builder.route(route.message.clone(), route.to_route())?;
        }
        let table = builder.build();
        table.validate_transports(|name| self.transports.contains_key(name))?;
        Ok(table)
    }

    /// Configuration preset for local development.
    ///
    /// ```
    /// use courier_config::CourierConfig;
    /// use courier_telemetry::LogFormat;
    ///
    /// let config = CourierConfig::development();
    /// assert_eq!(config.logging.format, LogFormat::Pretty);
    /// assert!(config.bus.allow_no_handlers);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        Self {
            bus: BusConfig {
                allow_no_handlers: true,
                ..BusConfig::default()
            },
            worker: WorkerConfig {
                poll_interval_ms: 100,
                ..WorkerConfig::default()
            },
            logging: LogConfig::development(),
            ..Self::default()
        }
    }

    /// Configuration preset for production.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig::production(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_transport() -> CourierConfig {
        let mut config = CourierConfig::default();
        config
            .transports
            .insert("async".into(), TransportConfig::new("nats://localhost:4222?stream=jobs"));
        config
    }

    #[test]
    fn test_default_is_valid() {
        CourierConfig::default().validate().unwrap();
        CourierConfig::development().validate().unwrap();
        CourierConfig::production().validate().unwrap();
    }

    #[test]
    fn test_routing_table_built() {
        let mut config = with_transport();
        let mut route = RouteConfig::new("Import");
        route.senders = vec!["async".into()];
        config.routing.push(route);
        config.routing.push(RouteConfig::new("GetUser"));

        let table = config.routing_table().unwrap();
        assert_eq!(table.senders_for("Import"), ["async".to_string()]);
        assert!(table.senders_for("GetUser").is_empty());
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let mut config = with_transport();
        config.routing.push(RouteConfig::new("Import"));
        config.routing.push(RouteConfig::new("Import"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Import"));
    }

    #[test]
    fn test_unknown_sender_rejected() {
        let mut config = with_transport();
        let mut route = RouteConfig::new("Import");
        route.senders = vec!["missing".into()];
        config.routing.push(route);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_dsn_rejected() {
        let mut config = CourierConfig::default();
        config.transports.insert("async".into(), TransportConfig::new("localhost"));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_receiver_rejected() {
        let mut config = with_transport();
        config.worker.receivers = vec!["other".into()];
        assert!(config.validate().is_err());
    }
}
