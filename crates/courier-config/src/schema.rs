//! Configuration schema types.
//!
//! This module defines the structure of every configuration section.

use courier_core::{CachePolicy, MessageRoute};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bus configuration section.
///
/// # Example
///
/// ```
/// use courier_config::BusConfig;
///
/// let config = BusConfig::default();
/// assert_eq!(config.name, "courier.bus");
/// assert!(!config.allow_no_handlers);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Bus name, stamped on every envelope dispatched through it.
    #[serde(default = "default_bus_name")]
    pub name: String,

    /// Whether messages without a handler are silently accepted.
    #[serde(default)]
    pub allow_no_handlers: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: default_bus_name(),
            allow_no_handlers: false,
        }
    }
}

fn default_bus_name() -> String {
    "courier.bus".to_string()
}

/// One named transport.
///
/// ```toml
/// [transports.async]
/// dsn = "nats://localhost:4222?stream=jobs&batch=20"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Connection string; the scheme selects the transport factory.
    pub dsn: String,
}

impl TransportConfig {
    /// A transport connecting to `dsn`.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

/// Routing of one message type.
///
/// ```toml
/// [[routing]]
/// message = "ImportCatalog"
/// senders = ["async"]
/// deduplicate = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Message type name.
    pub message: String,

    /// Transports the message is sent to; empty to handle it locally.
    #[serde(default)]
    pub senders: Vec<String>,

    /// Drop in-flight duplicates of the message.
    #[serde(default)]
    pub deduplicate: bool,

    /// Handle the message inside a transaction.
    #[serde(default)]
    pub transactional: bool,

    /// Transaction resource; `default` when unset.
    #[serde(default)]
    pub transaction_resource: Option<String>,

    /// Cache policy for query results.
    #[serde(default)]
    pub cache: Option<CachePolicy>,

    /// Free-form per-route options, reported by the backlog monitor.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl RouteConfig {
    /// A route handling `message` locally.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            senders: Vec::new(),
            deduplicate: false,
            transactional: false,
            transaction_resource: None,
            cache: None,
            options: Map::new(),
        }
    }

    /// The runtime route this section describes.
    #[must_use]
    pub fn to_route(&self) -> MessageRoute {
        let mut route = if self.senders.is_empty() {
            MessageRoute::local()
        } else {
            MessageRoute::to(self.senders.iter().cloned())
        };
        if self.deduplicate {
            route = route.deduplicated();
        }
        if self.transactional {
            route = route.transactional(self.transaction_resource.as_deref());
        }
        if let Some(policy) = &self.cache {
            route = route.cached(policy.clone());
        }
        for (key, value) in &self.options {
            route = route.option(key.clone(), value.clone());
        }
        route
    }
}

/// Security configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Identity provider used when nothing else names one.
    #[serde(default)]
    pub default_provider: Option<String>,
}

/// Worker configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Pause between polls that found nothing, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Transports the worker consumes; empty for every transport.
    #[serde(default)]
    pub receivers: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            receivers: Vec::new(),
        }
    }
}

const fn default_poll_interval() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_config_to_route() {
        let mut config = RouteConfig::new("ImportCatalog");
        config.senders = vec!["async".into()];
        config.deduplicate = true;
        config.transactional = true;
        config.options.insert("priority".into(), json!("high"));

        let route = config.to_route();
        assert_eq!(route.senders, vec!["async".to_string()]);
        assert!(route.deduplicate);
        assert!(route.transactional);
        assert_eq!(route.transaction_resource, None);
        assert_eq!(route.options.get("priority"), Some(&json!("high")));
    }

    #[test]
    fn test_unknown_route_field_rejected() {
        let err = serde_json::from_value::<RouteConfig>(json!({"message": "A", "sender": ["x"]}));
        assert!(err.is_err());
    }

    #[test]
    fn test_worker_defaults() {
        let worker: WorkerConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(worker.poll_interval_ms, 1000);
        assert!(worker.receivers.is_empty());
    }
}
