//! The message bus.
//!
//! A [`MessageBus`] owns one pipeline of the standard stages and the
//! handlers behind it. Cloning a bus is cheap and every clone dispatches
//! through the same stages, so handlers can hold a clone to dispatch further
//! messages.

use crate::BacklogMonitor;
use courier_config::CourierConfig;
use courier_core::stamp::HandledStamp;
use courier_core::{
    BoxFuture, CacheStore, Counter, CourierError, CourierResult, Envelope, FirewallResolver, HandlerRegistry,
    HandlerResolver, InMemoryCacheStore, InMemoryCounter, Message, RoutingTable, TransactionManager, UserProvider,
};
use courier_middleware::stages::{
    BacklogMiddleware, CacheMiddleware, DeduplicationMiddleware, DispatchLoggingMiddleware, HandleMessage,
    MessageMetadataMiddleware, OriginMiddleware, SecurityMiddleware, SendMessageMiddleware, TransactionMiddleware,
};
use courier_middleware::{DispatchContext, Pipeline, ScopedSlot, TokenStorage};
use courier_transport::{TransportFactories, TransportRegistry};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

struct BusInner {
    name: String,
    pipeline: Pipeline,
    terminal: HandleMessage,
    routing: Arc<RoutingTable>,
    transports: Arc<TransportRegistry>,
    counter: Arc<dyn Counter>,
    storage: TokenStorage,
    depth: ScopedSlot<usize>,
}

/// Dispatches envelopes through the standard middleware stages.
///
/// # Example
///
/// ```
/// use courier::MessageBus;
/// use courier_core::{HandlerRegistry, Message};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let handlers = HandlerRegistry::new().register("GetAnswer", "answer", |_env| async { Ok(json!(42)) });
/// let bus = MessageBus::builder("query.bus").handlers(handlers).build().unwrap();
///
/// let answer = bus.query(Message::new("GetAnswer", json!({}))).await.unwrap();
/// assert_eq!(answer, json!(42));
/// # });
/// ```
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Starts building a bus named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MessageBusBuilder {
        MessageBusBuilder::new(name)
    }

    /// Starts building a bus from configuration.
    ///
    /// Transports are created with `factories`; handlers, identity providers
    /// and transaction managers are added on the returned builder.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid or a
    /// transport cannot be created.
    pub fn from_config(config: &CourierConfig, factories: &TransportFactories) -> CourierResult<MessageBusBuilder> {
        config.validate()?;
        let transports = factories.create_all(
            config
                .transports
                .iter()
                .map(|(name, transport)| (name.as_str(), transport.dsn.as_str())),
        )?;
        Ok(MessageBusBuilder::new(config.bus.name.clone())
            .routing(config.routing_table()?)
            .transports(transports)
            .allow_no_handlers(config.bus.allow_no_handlers)
            .default_provider(config.security.default_provider.clone()))
    }

    /// The bus name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The routing table.
    #[must_use]
    pub fn routing(&self) -> &Arc<RoutingTable> {
        &self.inner.routing
    }

    /// The registered transports.
    #[must_use]
    pub fn transports(&self) -> &Arc<TransportRegistry> {
        &self.inner.transports
    }

    /// The backlog counter.
    #[must_use]
    pub fn counter(&self) -> &Arc<dyn Counter> {
        &self.inner.counter
    }

    /// The storage of the current security context.
    #[must_use]
    pub fn token_storage(&self) -> &TokenStorage {
        &self.inner.storage
    }

    /// A backlog monitor over this bus's transports and routes, falling back
    /// to the backlog counter for transports that cannot count.
    #[must_use]
    pub fn backlog_monitor(&self) -> BacklogMonitor {
        BacklogMonitor::new(Arc::clone(&self.inner.transports), Arc::clone(&self.inner.routing))
            .with_counter(Arc::clone(&self.inner.counter))
    }

    /// Stage names in dispatch order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.inner.pipeline.stage_names()
    }

    /// Dispatches an envelope.
    ///
    /// Routed envelopes come back with a `SentStamp` per transport; handled
    /// ones with a `HandledStamp` per handler.
    pub fn dispatch(&self, envelope: Envelope) -> BoxFuture<'_, CourierResult<Envelope>> {
        Box::pin(async move {
            let depth = self.inner.depth.get();
            let mut ctx = DispatchContext::new(self.inner.name.as_str(), envelope.message_name()).with_depth(depth);
            let pipeline = self.inner.pipeline.dispatch(&mut ctx, envelope, &self.inner.terminal);
            self.inner.depth.scope(depth + 1, pipeline).await
        })
    }

    /// Dispatches a bare message.
    pub async fn dispatch_message(&self, message: Message) -> CourierResult<Envelope> {
        self.dispatch(Envelope::new(message)).await
    }

    /// Dispatches a message and returns the result of its only handler.
    ///
    /// # Errors
    ///
    /// Besides dispatch failures, returns a logic error if the message was
    /// handled zero times (for instance because it was routed to a
    /// transport) or more than once.
    pub async fn query(&self, message: Message) -> CourierResult<Value> {
        let envelope = self.dispatch_message(message).await?;
        single_result(&envelope)
    }

    /// Runs the setup of every transport supporting it.
    ///
    /// # Errors
    ///
    /// Returns the first setup failure.
    pub async fn setup_transports(&self) -> CourierResult<()> {
        for (name, transport) in self.inner.transports.iter() {
            if let Some(setupable) = transport.setupable() {
                setupable.setup().await?;
                info!(transport = name, "transport set up");
            }
        }
        Ok(())
    }
}

fn single_result(envelope: &Envelope) -> CourierResult<Value> {
    let handled = envelope.all::<HandledStamp>();
    match handled.as_slice() {
        [only] => Ok(only.result.clone()),
        [] => Err(CourierError::logic(format!(
            "message of type \"{}\" was handled zero times; exactly one handler is expected when querying",
            envelope.message_name()
        ))),
        many => {
            let names: Vec<&str> = many.iter().map(|stamp| stamp.handler_name.as_str()).collect();
            Err(CourierError::logic(format!(
                "message of type \"{}\" was handled {} times by {}; exactly one handler is expected when querying",
                envelope.message_name(),
                many.len(),
                names.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.inner.name)
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

/// Builder for [`MessageBus`].
///
/// Everything but the name has a default: no routes, no transports, no
/// handlers, in-memory cache store and backlog counter.
pub struct MessageBusBuilder {
    name: String,
    routing: RoutingTable,
    transports: TransportRegistry,
    resolver: Option<Arc<dyn HandlerResolver>>,
    allow_no_handlers: bool,
    cache: Option<Arc<dyn CacheStore>>,
    counter: Option<Arc<dyn Counter>>,
    storage: TokenStorage,
    providers: IndexMap<String, Arc<dyn UserProvider>>,
    firewall: Option<Arc<dyn FirewallResolver>>,
    default_provider: Option<String>,
    transaction_managers: IndexMap<String, Arc<dyn TransactionManager>>,
}

impl MessageBusBuilder {
    /// Creates a builder for a bus named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routing: RoutingTable::default(),
            transports: TransportRegistry::new(),
            resolver: None,
            allow_no_handlers: false,
            cache: None,
            counter: None,
            storage: TokenStorage::new(),
            providers: IndexMap::new(),
            firewall: None,
            default_provider: None,
            transaction_managers: IndexMap::new(),
        }
    }

    /// Sets the routing table.
    #[must_use]
    pub fn routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    /// Sets the transports.
    #[must_use]
    pub fn transports(mut self, transports: TransportRegistry) -> Self {
        self.transports = transports;
        self
    }

    /// Sets the handlers from a registry.
    #[must_use]
    pub fn handlers(self, registry: HandlerRegistry) -> Self {
        self.resolver(Arc::new(registry))
    }

    /// Sets the handler resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Accepts messages nobody handles instead of failing.
    #[must_use]
    pub const fn allow_no_handlers(mut self, allow: bool) -> Self {
        self.allow_no_handlers = allow;
        self
    }

    /// Sets the cache store used for deduplication and query caching.
    #[must_use]
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Sets the backlog counter.
    #[must_use]
    pub fn counter(mut self, counter: Arc<dyn Counter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Shares an existing security context storage.
    #[must_use]
    pub fn token_storage(mut self, storage: TokenStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Registers an identity provider.
    #[must_use]
    pub fn user_provider(mut self, id: impl Into<String>, provider: Arc<dyn UserProvider>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    /// Sets the firewall resolver.
    #[must_use]
    pub fn firewall(mut self, firewall: Arc<dyn FirewallResolver>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    /// Sets the default identity provider id.
    #[must_use]
    pub fn default_provider(mut self, id: Option<String>) -> Self {
        self.default_provider = id;
        self
    }

    /// Registers the transaction manager of `resource`.
    #[must_use]
    pub fn transaction_manager(mut self, resource: impl Into<String>, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_managers.insert(resource.into(), manager);
        self
    }

    /// Assembles the bus.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a route names an unregistered
    /// transport.
    pub fn build(self) -> CourierResult<MessageBus> {
        let transports = Arc::new(self.transports);
        self.routing.validate_transports(|name| transports.contains(name))?;

        let routing = Arc::new(self.routing);
        let cache: Arc<dyn CacheStore> = self.cache.unwrap_or_else(|| Arc::new(InMemoryCacheStore::new()));
        let counter: Arc<dyn Counter> = self.counter.unwrap_or_else(|| Arc::new(InMemoryCounter::new()));
        let resolver: Arc<dyn HandlerResolver> = self.resolver.unwrap_or_else(|| Arc::new(HandlerRegistry::new()));

        let mut security = SecurityMiddleware::new(self.storage.clone()).default_provider(self.default_provider);
        for (id, provider) in self.providers {
            security = security.provider(id, provider);
        }
        if let Some(firewall) = self.firewall {
            security = security.firewall(firewall);
        }

        let mut transaction = TransactionMiddleware::new(Arc::clone(&routing));
        for (resource, manager) in self.transaction_managers {
            transaction = transaction.manager(resource, manager);
        }

        let pipeline = Pipeline::builder()
            .stage(DispatchLoggingMiddleware::new())
            .stage(OriginMiddleware::new())
            .stage(security)
            .stage(MessageMetadataMiddleware::new(Arc::clone(&routing)).bus_name(self.name.clone()))
            .stage(DeduplicationMiddleware::new(Arc::clone(&cache)))
            .stage(BacklogMiddleware::new(Arc::clone(&counter)))
            .stage(CacheMiddleware::new(cache, Arc::clone(&routing)))
            .stage(transaction)
            .stage(
                SendMessageMiddleware::new(Arc::clone(&routing), Arc::clone(&transports))
                    .backlog_counter(Arc::clone(&counter)),
            )
            .try_build()?;

        info!(bus = %self.name, stages = pipeline.stage_count(), "message bus ready");

        Ok(MessageBus {
            inner: Arc::new(BusInner {
                name: self.name,
                pipeline,
                terminal: HandleMessage::new(resolver).allow_no_handlers(self.allow_no_handlers),
                routing,
                transports,
                counter,
                storage: self.storage,
                depth: ScopedSlot::new(0),
            }),
        })
    }
}

impl std::fmt::Debug for MessageBusBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBusBuilder")
            .field("name", &self.name)
            .field("transports", &self.transports.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::MessageRoute;
    use courier_middleware::Stage;
    use courier_transport::InMemoryTransport;
    use serde_json::json;

    #[test]
    fn test_stages_in_standard_order() {
        let bus = MessageBus::builder("bus").build().unwrap();
        let expected: Vec<&str> = Stage::ALL.iter().map(|stage| stage.name()).collect();
        assert_eq!(bus.stage_names(), expected);
    }

    #[test]
    fn test_route_to_unknown_transport_rejected() {
        let routing = RoutingTable::builder()
            .route("Import", MessageRoute::to(["async"]))
            .unwrap()
            .build();
        let err = MessageBus::builder("bus").routing(routing).build().unwrap_err();
        assert!(matches!(err, CourierError::Config { .. }));
    }

    #[tokio::test]
    async fn test_query_requires_exactly_one_result() {
        let handlers = HandlerRegistry::new()
            .register("One", "only", |_env| async { Ok(json!(1)) })
            .register("Two", "first", |_env| async { Ok(json!(1)) })
            .register("Two", "second", |_env| async { Ok(json!(2)) });
        let bus = MessageBus::builder("bus")
            .handlers(handlers)
            .allow_no_handlers(true)
            .build()
            .unwrap();

        assert_eq!(bus.query(Message::new("One", json!({}))).await.unwrap(), json!(1));

        let zero = bus.query(Message::new("None", json!({}))).await.unwrap_err();
        assert!(matches!(zero, CourierError::Logic { .. }));
        assert!(zero.to_string().contains("zero times"));

        let two = bus.query(Message::new("Two", json!({}))).await.unwrap_err();
        assert!(two.to_string().contains("first, second"));
    }

    #[tokio::test]
    async fn test_routed_query_is_handled_zero_times() {
        let routing = RoutingTable::builder()
            .route("Report", MessageRoute::to(["async"]))
            .unwrap()
            .build();
        let transports = TransportRegistry::new()
            .with("async", Arc::new(InMemoryTransport::new()))
            .unwrap();
        let bus = MessageBus::builder("bus")
            .routing(routing)
            .transports(transports)
            .build()
            .unwrap();

        let err = bus.query(Message::new("Report", json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("zero times"));
    }

    #[tokio::test]
    async fn test_unhandled_message_fails_by_default() {
        let bus = MessageBus::builder("bus").build().unwrap();
        let err = bus.dispatch_message(Message::new("Orphan", json!({}))).await.unwrap_err();
        assert!(matches!(err, CourierError::NoHandler { .. }));
    }
}
