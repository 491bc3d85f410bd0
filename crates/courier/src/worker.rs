//! Transport consumption loop.
//!
//! A [`Worker`] pulls envelopes from its receiver transports and dispatches
//! them on a [`MessageBus`]. Successfully handled envelopes are acknowledged;
//! failed ones are rejected, carrying a [`RejectDelayStamp`] when the failure
//! names a redelivery delay.

use crate::MessageBus;
use courier_config::WorkerConfig;
use courier_core::stamp::{ConsumedByWorkerStamp, ReceivedStamp, RejectDelayStamp};
use courier_core::{redelivery_delay, CourierResult, Envelope};
use courier_telemetry::metrics::{record_received, Outcome};
use courier_transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default pause between polls that found nothing.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Counts of one or more polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Envelopes fetched from transports.
    pub received: usize,
    /// Envelopes handled and acknowledged.
    pub acknowledged: usize,
    /// Envelopes whose handling failed and were rejected.
    pub rejected: usize,
}

impl PollStats {
    fn merge(&mut self, other: Self) {
        self.received += other.received;
        self.acknowledged += other.acknowledged;
        self.rejected += other.rejected;
    }
}

/// Consumes transports and dispatches what they deliver.
#[derive(Debug, Clone)]
pub struct Worker {
    bus: MessageBus,
    receivers: Vec<String>,
    poll_interval: Duration,
}

impl Worker {
    /// Creates a worker consuming `receivers`, or every transport of the bus
    /// when `receivers` is empty.
    pub fn new<I, S>(bus: MessageBus, receivers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut receivers: Vec<String> = receivers.into_iter().map(Into::into).collect();
        if receivers.is_empty() {
            receivers = bus.transports().names().map(str::to_string).collect();
        }
        Self {
            bus,
            receivers,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a worker from its configuration section.
    #[must_use]
    pub fn from_config(bus: MessageBus, config: &WorkerConfig) -> Self {
        Self::new(bus, config.receivers.iter().cloned()).poll_interval(Duration::from_millis(config.poll_interval_ms))
    }

    /// Sets the pause between polls that found nothing.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The consumed transports.
    #[must_use]
    pub fn receivers(&self) -> &[String] {
        &self.receivers
    }

    /// Fetches one batch from every receiver and handles it.
    ///
    /// # Errors
    ///
    /// Returns an error if a receiver is not registered on the bus or a
    /// transport fails to deliver, acknowledge or reject. Handling failures
    /// are not errors; they reject the envelope.
    pub async fn poll_once(&self) -> CourierResult<PollStats> {
        let mut stats = PollStats::default();
        for name in &self.receivers {
            let transport = Arc::clone(self.bus.transports().require(name)?);
            let batch = transport.get().await?;
            if !batch.is_empty() {
                debug!(transport = %name, count = batch.len(), "received batch");
            }
            for envelope in batch {
                stats.received += 1;
                let envelope = envelope.with(ReceivedStamp::new(name.as_str())).with(ConsumedByWorkerStamp);
                if self.handle(name, transport.as_ref(), envelope).await? {
                    stats.acknowledged += 1;
                } else {
                    stats.rejected += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn handle(&self, name: &str, transport: &dyn Transport, envelope: Envelope) -> CourierResult<bool> {
        match self.bus.dispatch(envelope.clone()).await {
            Ok(handled) => {
                transport.ack(&handled).await?;
                record_received(name, Outcome::Ok);
                Ok(true)
            }
            Err(err) => {
                let envelope = match redelivery_delay(&err) {
                    Some(delay) => {
                        warn!(
                            transport = %name,
                            message = %envelope.message_name(),
                            error = %err,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "handling failed, redelivery delayed"
                        );
                        envelope.with(RejectDelayStamp::from_duration(delay))
                    }
                    None => {
                        warn!(transport = %name, message = %envelope.message_name(), error = %err, "handling failed");
                        envelope
                    }
                };
                transport.reject(&envelope).await?;
                record_received(name, Outcome::Failed);
                Ok(false)
            }
        }
    }

    /// Polls until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Sleeps for the poll interval whenever a poll finds nothing or fails.
    /// Returns the totals over every poll.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> PollStats {
        let mut total = PollStats::default();
        info!(receivers = ?self.receivers, "worker started");

        while !*shutdown.borrow() {
            let idle = match self.poll_once().await {
                Ok(stats) => {
                    total.merge(stats);
                    stats.received == 0
                }
                Err(err) => {
                    warn!(error = %err, "poll failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    () = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(
            received = total.received,
            acknowledged = total.acknowledged,
            rejected = total.rejected,
            "worker stopped"
        );
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{CourierError, HandlerRegistry, Message, MessageRoute, RoutingTable};
    use courier_transport::{InMemoryTransport, TransportRegistry};
    use serde_json::json;

    fn bus(jobs: Arc<InMemoryTransport>, handlers: HandlerRegistry) -> MessageBus {
        let routing = RoutingTable::builder()
            .route("Import", MessageRoute::to(["jobs"]))
            .unwrap()
            .build();
        MessageBus::builder("bus")
            .routing(routing)
            .transports(TransportRegistry::new().with("jobs", jobs).unwrap())
            .handlers(handlers)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_receivers_default_to_every_transport() {
        let jobs = Arc::new(InMemoryTransport::new());
        let worker = Worker::new(bus(jobs, HandlerRegistry::new()), Vec::<String>::new());
        assert_eq!(worker.receivers(), ["jobs".to_string()]);
    }

    #[tokio::test]
    async fn test_handled_envelope_acknowledged() {
        let jobs = Arc::new(InMemoryTransport::new());
        let handlers = HandlerRegistry::new().register("Import", "import", |_env| async { Ok(json!("done")) });
        let bus = bus(jobs.clone(), handlers);
        bus.dispatch_message(Message::new("Import", json!({"file": "a.csv"})))
            .await
            .unwrap();

        let worker = Worker::new(bus, ["jobs"]);
        let stats = worker.poll_once().await.unwrap();

        assert_eq!(
            stats,
            PollStats {
                received: 1,
                acknowledged: 1,
                rejected: 0
            }
        );
        let acked = jobs.acknowledged();
        assert_eq!(acked.len(), 1);
        assert!(acked[0].has::<ConsumedByWorkerStamp>());
        assert_eq!(acked[0].last::<ReceivedStamp>().unwrap().transport_name, "jobs");
    }

    #[tokio::test]
    async fn test_failed_envelope_rejected_without_delay() {
        let jobs = Arc::new(InMemoryTransport::new());
        let handlers = HandlerRegistry::new().register("Import", "import", |_env| async {
            Err::<serde_json::Value, _>(CourierError::logic("corrupt file").into())
        });
        let bus = bus(jobs.clone(), handlers);
        bus.dispatch_message(Message::new("Import", json!({}))).await.unwrap();

        let stats = Worker::new(bus, ["jobs"]).poll_once().await.unwrap();

        assert_eq!(stats.rejected, 1);
        let rejected = jobs.rejected();
        assert_eq!(rejected.len(), 1);
        assert!(!rejected[0].has::<RejectDelayStamp>());
    }

    #[tokio::test]
    async fn test_unknown_receiver_fails_poll() {
        let jobs = Arc::new(InMemoryTransport::new());
        let worker = Worker::new(bus(jobs, HandlerRegistry::new()), ["missing"]);
        let err = worker.poll_once().await.unwrap_err();
        assert!(matches!(err, CourierError::Config { .. }));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let jobs = Arc::new(InMemoryTransport::new());
        let worker = Worker::new(bus(jobs, HandlerRegistry::new()), ["jobs"]).poll_interval(Duration::from_millis(5));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let total = handle.await.unwrap();
        assert_eq!(total, PollStats::default());
    }
}
