//! Backlog monitoring.
//!
//! [`BacklogMonitor::jobs`] reports how many messages wait on each
//! transport. Transports are asked in order of decreasing precision:
//!
//! 1. a [`BacklogInspector`](courier_transport::BacklogInspector) reports one
//!    count per message type, and configured types it has not seen count 0;
//! 2. a [`MessageCountAware`](courier_transport::MessageCountAware) transport
//!    reports a single total without a message type;
//! 3. any other transport yields one record per configured message type,
//!    counted from the bus [`Counter`] when the monitor has one (the backlog
//!    stage adds one per send and removes one per receipt) and unknown
//!    otherwise.
//!
//! A broker that cannot be reached reports an empty backlog rather than
//! failing the whole report.

use courier_core::{backlog_key, Counter, CourierResult, RoutingTable};
use courier_transport::TransportRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Backlog of one transport, optionally narrowed to one message type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    /// Transport name.
    pub transport: String,
    /// Message type; `None` for a transport-wide total.
    pub message: Option<String>,
    /// Waiting messages; `None` when the transport cannot tell.
    pub count: Option<u64>,
    /// Options of the message route.
    pub options: Map<String, Value>,
}

impl JobRecord {
    fn sort_key(&self) -> String {
        format!("{}:{}", self.transport, self.message.as_deref().unwrap_or_default())
    }
}

/// Reports transport backlogs.
#[derive(Clone)]
pub struct BacklogMonitor {
    transports: Arc<TransportRegistry>,
    routing: Arc<RoutingTable>,
    counter: Option<Arc<dyn Counter>>,
}

impl BacklogMonitor {
    /// Creates a monitor over `transports`, using `routing` to know which
    /// message types each transport carries.
    #[must_use]
    pub const fn new(transports: Arc<TransportRegistry>, routing: Arc<RoutingTable>) -> Self {
        Self {
            transports,
            routing,
            counter: None,
        }
    }

    /// Counts configured types on transports that cannot report their own
    /// backlog from `counter`.
    #[must_use]
    pub fn with_counter(mut self, counter: Arc<dyn Counter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Returns the backlog records sorted by `transport:message`.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure.
    pub async fn jobs(&self) -> CourierResult<Vec<JobRecord>> {
        let mut records = Vec::new();

        for (name, transport) in self.transports.iter() {
            let configured = self.routing.messages_for_transport(name);

            if let Some(inspector) = transport.backlog_inspector() {
                let mut counts = inspector.backlog_by_message().await?;
                for (message, _) in &configured {
                    counts.entry((*message).to_string()).or_insert(0);
                }
                for (message, count) in counts {
                    let options = self.options_for(&message);
                    records.push(JobRecord {
                        transport: name.to_string(),
                        message: Some(message),
                        count: Some(count),
                        options,
                    });
                }
            } else if let Some(counter) = transport.message_counter() {
                records.push(JobRecord {
                    transport: name.to_string(),
                    message: None,
                    count: Some(counter.message_count().await?),
                    options: Map::new(),
                });
            } else {
                for (message, options) in configured {
                    let count = match &self.counter {
                        Some(counter) => {
                            let value = counter.get(&backlog_key(name, message)).await?;
                            Some(u64::try_from(value).unwrap_or(0))
                        }
                        None => None,
                    };
                    records.push(JobRecord {
                        transport: name.to_string(),
                        message: Some(message.to_string()),
                        count,
                        options: options.clone(),
                    });
                }
            }
        }

        records.sort_by_cached_key(JobRecord::sort_key);
        Ok(records)
    }

    fn options_for(&self, message: &str) -> Map<String, Value> {
        self.routing
            .route(message)
            .map(|route| route.options.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for BacklogMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacklogMonitor")
            .field("transports", &self.transports.names().collect::<Vec<_>>())
            .field("counted", &self.counter.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{BoxFuture, Envelope, InMemoryCounter, MessageRoute};
    use courier_transport::Transport;
    use serde_json::json;

    /// A transport with no capabilities at all.
    struct Opaque;

    impl Transport for Opaque {
        fn send(&self, envelope: Envelope) -> BoxFuture<'_, CourierResult<Envelope>> {
            Box::pin(async move { Ok(envelope) })
        }

        fn get(&self) -> BoxFuture<'_, CourierResult<Vec<Envelope>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn ack<'a>(&'a self, _envelope: &'a Envelope) -> BoxFuture<'a, CourierResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn reject<'a>(&'a self, _envelope: &'a Envelope) -> BoxFuture<'a, CourierResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_opaque_transport_lists_configured_types() {
        let routing = RoutingTable::builder()
            .route("Zeta", MessageRoute::to(["legacy"]).option("team", json!("billing")))
            .unwrap()
            .route("Alpha", MessageRoute::to(["legacy"]))
            .unwrap()
            .build();
        let transports = TransportRegistry::new().with("legacy", Arc::new(Opaque)).unwrap();
        let monitor = BacklogMonitor::new(Arc::new(transports), Arc::new(routing));

        let jobs = monitor.jobs().await.unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].message.as_deref(), Some("Alpha"));
        assert_eq!(jobs[0].count, None);
        assert_eq!(jobs[1].message.as_deref(), Some("Zeta"));
        assert_eq!(jobs[1].options.get("team"), Some(&json!("billing")));
    }

    #[tokio::test]
    async fn test_no_transports_no_records() {
        let monitor = BacklogMonitor::new(Arc::new(TransportRegistry::new()), Arc::new(RoutingTable::default()));
        assert!(monitor.jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counter_fills_in_opaque_transport() {
        let routing = RoutingTable::builder()
            .route("Export", MessageRoute::to(["legacy"]))
            .unwrap()
            .route("Purge", MessageRoute::to(["legacy"]))
            .unwrap()
            .build();
        let transports = TransportRegistry::new().with("legacy", Arc::new(Opaque)).unwrap();
        let counter = Arc::new(InMemoryCounter::new());
        counter.delta(&backlog_key("legacy", "Export"), 3).await.unwrap();
        counter.delta(&backlog_key("legacy", "Purge"), -1).await.unwrap();

        let monitor = BacklogMonitor::new(Arc::new(transports), Arc::new(routing)).with_counter(counter);
        let jobs = monitor.jobs().await.unwrap();

        let counts: Vec<(Option<&str>, Option<u64>)> =
            jobs.iter().map(|job| (job.message.as_deref(), job.count)).collect();
        assert_eq!(counts, [(Some("Export"), Some(3)), (Some("Purge"), Some(0))]);
    }
}
