//! Static message routing.
//!
//! Routing is declared once, at startup, and frozen into a [`RoutingTable`]:
//!
//! - `message type → [transport names]` (where a message is sent)
//! - `transport → {message type → options}` (what each transport carries)
//! - per-message-type intents (deduplication, transactions, caching)
//!
//! Conflicting declarations are rejected while the table is being built, never
//! at dispatch time.
//!
//! ```
//! use courier_core::routing::{MessageRoute, RoutingTable};
//!
//! let table = RoutingTable::builder()
//!     .route("SendInvoice", MessageRoute::to(["async"])).unwrap()
//!     .build();
//!
//! assert_eq!(table.senders_for("SendInvoice"), ["async".to_string()]);
//! assert!(RoutingTable::builder()
//!     .route("SendInvoice", MessageRoute::to(["async"])).unwrap()
//!     .route("SendInvoice", MessageRoute::to(["sync"]))
//!     .is_err());
//! ```

use crate::error::{CourierError, CourierResult};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Cache-aside policy for a query-style message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CachePolicy {
    /// Explicit cache key; defaults to `{message}:{payload fingerprint}`.
    #[serde(default)]
    pub key: Option<String>,
    /// Time to live in seconds; `None` keeps results until invalidated.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    /// Tags attached to cached results.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Tags invalidated after a message of this type is handled successfully.
    #[serde(default)]
    pub invalidate_tags: Vec<String>,
}

impl CachePolicy {
    /// Returns true if results of this type are cached.
    #[must_use]
    pub fn caches_results(&self) -> bool {
        self.key.is_some() || self.ttl_secs.is_some() || !self.tags.is_empty()
    }

    /// Returns the time to live.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Everything declared about one message type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRoute {
    /// Transports the message is sent to; empty for synchronous handling.
    pub senders: Vec<String>,
    /// Whether duplicate in-flight messages are dropped.
    pub deduplicate: bool,
    /// Whether handling runs inside a transaction.
    pub transactional: bool,
    /// The transactional resource, `None` for the default one.
    pub transaction_resource: Option<String>,
    /// Cache-aside policy.
    pub cache: Option<CachePolicy>,
    /// Free-form per-route options, surfaced in backlog reports.
    pub options: Map<String, Value>,
}

impl MessageRoute {
    /// A route sending to the given transports.
    #[must_use]
    pub fn to<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            senders: senders.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A route handled synchronously (no senders).
    #[must_use]
    pub fn local() -> Self {
        Self::default()
    }

    /// Marks the message type as deduplicated.
    #[must_use]
    pub fn deduplicated(mut self) -> Self {
        self.deduplicate = true;
        self
    }

    /// Marks the message type as transactional on `resource`.
    #[must_use]
    pub fn transactional(mut self, resource: Option<&str>) -> Self {
        self.transactional = true;
        self.transaction_resource = resource.map(str::to_string);
        self
    }

    /// Sets the cache policy.
    #[must_use]
    pub fn cached(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }

    /// Adds a route option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// The frozen routing table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingTable {
    routes: IndexMap<String, MessageRoute>,
}

impl RoutingTable {
    /// Creates a routing table builder.
    #[must_use]
    pub fn builder() -> RoutingTableBuilder {
        RoutingTableBuilder::default()
    }

    /// Returns the declaration for a message type.
    #[must_use]
    pub fn route(&self, message: &str) -> Option<&MessageRoute> {
        self.routes.get(message)
    }

    /// Returns the transports a message type is sent to.
    #[must_use]
    pub fn senders_for(&self, message: &str) -> &[String] {
        self.routes.get(message).map_or(&[], |route| route.senders.as_slice())
    }

    /// Iterates over declared message types in declaration order.
    pub fn messages(&self) -> impl Iterator<Item = (&str, &MessageRoute)> {
        self.routes.iter().map(|(name, route)| (name.as_str(), route))
    }

    /// Returns the message types carried by `transport`, with their options.
    #[must_use]
    pub fn messages_for_transport(&self, transport: &str) -> Vec<(&str, &Map<String, Value>)> {
        self.routes
            .iter()
            .filter(|(_, route)| route.senders.iter().any(|s| s == transport))
            .map(|(name, route)| (name.as_str(), &route.options))
            .collect()
    }

    /// Returns `{transport → {message type → options}}`.
    #[must_use]
    pub fn transport_messages(&self) -> IndexMap<&str, IndexMap<&str, &Map<String, Value>>> {
        let mut by_transport: IndexMap<&str, IndexMap<&str, &Map<String, Value>>> = IndexMap::new();
        for (name, route) in &self.routes {
            for sender in &route.senders {
                by_transport
                    .entry(sender.as_str())
                    .or_default()
                    .insert(name.as_str(), &route.options);
            }
        }
        by_transport
    }

    /// Fails if a route references a transport for which `is_known` is false.
    pub fn validate_transports(&self, is_known: impl Fn(&str) -> bool) -> CourierResult<()> {
        for (name, route) in &self.routes {
            if let Some(unknown) = route.senders.iter().find(|s| !is_known(s)) {
                return Err(CourierError::config(format!(
                    "message \"{name}\" is routed to unknown transport \"{unknown}\""
                )));
            }
        }
        Ok(())
    }

    /// Returns true if no route is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder rejecting duplicate and conflicting declarations.
#[derive(Debug, Default)]
pub struct RoutingTableBuilder {
    routes: IndexMap<String, MessageRoute>,
}

impl RoutingTableBuilder {
    /// Declares the route of one message type.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the message type is already declared,
    /// if its name is empty, or if it lists the same sender twice.
    pub fn route(mut self, message: impl Into<String>, route: MessageRoute) -> CourierResult<Self> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(CourierError::config("route declared for an empty message type"));
        }
        if self.routes.contains_key(&message) {
            return Err(CourierError::config(format!(
                "duplicate routing declaration for message \"{message}\""
            )));
        }

        let mut seen = IndexSet::new();
        for sender in &route.senders {
            if !seen.insert(sender.as_str()) {
                return Err(CourierError::config(format!(
                    "message \"{message}\" lists sender \"{sender}\" more than once"
                )));
            }
        }

        self.routes.insert(message, route);
        Ok(self)
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> RoutingTable {
        RoutingTable {
            routes: self.routes,
        }
    }
}
