//! Routing-declared stamps.
//!
//! Attaches the stamps implied by the routing table (deduplication, the
//! transactional resource) and the bus name, unless the envelope already
//! carries them. Later stages only look at stamps, never at the table.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use courier_core::stamp::{BusNameStamp, DeduplicateStamp, TransactionalStamp};
use courier_core::{BoxFuture, Envelope, RoutingTable};
use std::sync::Arc;

/// Stamps envelopes with their routing-declared intents.
#[derive(Debug, Clone)]
pub struct MessageMetadataMiddleware {
    routing: Arc<RoutingTable>,
    bus_name: Option<String>,
}

impl MessageMetadataMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(routing: Arc<RoutingTable>) -> Self {
        Self {
            routing,
            bus_name: None,
        }
    }

    /// Stamps envelopes with `bus_name` too.
    #[must_use]
    pub fn bus_name(mut self, bus_name: impl Into<String>) -> Self {
        self.bus_name = Some(bus_name.into());
        self
    }

    fn stamp(&self, mut envelope: Envelope) -> Envelope {
        if let Some(route) = self.routing.route(envelope.message_name()) {
            if route.deduplicate && !envelope.has::<DeduplicateStamp>() {
                envelope = envelope.with(DeduplicateStamp::new(true));
            }
            if route.transactional && !envelope.has::<TransactionalStamp>() {
                envelope = envelope.with(TransactionalStamp::new(true, route.transaction_resource.clone()));
            }
        }
        if let Some(bus_name) = &self.bus_name {
            if !envelope.has::<BusNameStamp>() {
                envelope = envelope.with(BusNameStamp::new(bus_name.clone()));
            }
        }
        envelope
    }
}

impl Middleware for MessageMetadataMiddleware {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult> {
        let envelope = self.stamp(envelope);
        Box::pin(next.run(ctx, envelope))
    }
}
