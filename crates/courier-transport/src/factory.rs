//! Transport construction from connection strings.

use crate::broker::BrokerConnector;
use crate::dsn::Dsn;
use crate::in_memory::InMemoryTransport;
use crate::registry::TransportRegistry;
use crate::transport::Transport;
use crate::work_queue::WorkQueueTransport;
use courier_core::{CourierError, CourierResult};
use std::sync::Arc;
use tracing::debug;

/// Builds transports for the DSN schemes it supports.
pub trait TransportFactory: Send + Sync {
    /// Returns true if this factory handles `dsn`.
    fn supports(&self, dsn: &Dsn) -> bool;

    /// Creates a transport.
    fn create(&self, name: &str, dsn: Dsn) -> CourierResult<Arc<dyn Transport>>;
}

/// Creates [`InMemoryTransport`]s for `in-memory://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryTransportFactory;

impl TransportFactory for InMemoryTransportFactory {
    fn supports(&self, dsn: &Dsn) -> bool {
        dsn.scheme() == "in-memory"
    }

    fn create(&self, _name: &str, dsn: Dsn) -> CourierResult<Arc<dyn Transport>> {
        let batch = dsn.option_or("batch", 10usize)?;
        Ok(Arc::new(InMemoryTransport::with_batch(batch)))
    }
}

/// Creates [`WorkQueueTransport`]s for `nats://` and `nats-jetstream://`.
pub struct WorkQueueTransportFactory {
    connector: Arc<dyn BrokerConnector>,
}

impl WorkQueueTransportFactory {
    /// Creates a factory opening broker clients through `connector`.
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self { connector }
    }
}

impl TransportFactory for WorkQueueTransportFactory {
    fn supports(&self, dsn: &Dsn) -> bool {
        matches!(dsn.scheme(), "nats" | "nats-jetstream")
    }

    fn create(&self, _name: &str, dsn: Dsn) -> CourierResult<Arc<dyn Transport>> {
        Ok(Arc::new(WorkQueueTransport::new(dsn, Arc::clone(&self.connector))?))
    }
}

/// An ordered list of factories; the first supporting a DSN wins.
#[derive(Default)]
pub struct TransportFactories {
    factories: Vec<Box<dyn TransportFactory>>,
}

impl TransportFactories {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a factory.
    #[must_use]
    pub fn with(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factories.push(Box::new(factory));
        self
    }

    /// Creates the transport named `name` from `dsn`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the DSN is invalid or no factory supports it.
    pub fn create(&self, name: &str, dsn: &str) -> CourierResult<Arc<dyn Transport>> {
        let dsn = Dsn::parse(dsn)?;
        let factory = self
            .factories
            .iter()
            .find(|f| f.supports(&dsn))
            .ok_or_else(|| {
                CourierError::config(format!(
                    "no transport supports DSN \"{dsn}\" (transport \"{name}\")"
                ))
            })?;
        debug!(transport = name, scheme = dsn.scheme(), "creating transport");
        factory.create(name, dsn)
    }

    /// Creates every `(name, dsn)` pair into a registry.
    pub fn create_all<'a>(
        &self,
        transports: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> CourierResult<TransportRegistry> {
        let mut registry = TransportRegistry::new();
        for (name, dsn) in transports {
            registry.insert(name, self.create(name, dsn)?)?;
        }
        Ok(registry)
    }
}

impl std::fmt::Debug for TransportFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportFactories")
            .field("count", &self.factories.len())
            .finish()
    }
}
