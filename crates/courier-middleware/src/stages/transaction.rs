//! Transactional handling.
//!
//! Envelopes stamped with an enabled [`TransactionalStamp`] are handled inside
//! a transaction on the stamped resource (`default` when unnamed). The
//! transaction commits when the rest of the chain succeeds and rolls back
//! when it fails; the handling error is returned either way.
//!
//! Only local handling is wrapped. An envelope that is about to be sent to a
//! transport gets its transaction when a worker receives it.
//!
//! A dispatch nested inside an open transaction on the same resource joins
//! it instead of opening a second one.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use crate::slot::ScopedSlot;
use courier_core::stamp::{ReceivedStamp, TransactionalStamp};
use courier_core::{BoxFuture, CourierError, Envelope, RoutingTable, TransactionManager};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource used when a transactional stamp names none.
pub const DEFAULT_RESOURCE: &str = "default";

/// Wraps local handling in a transaction.
#[derive(Clone)]
pub struct TransactionMiddleware {
    managers: IndexMap<String, Arc<dyn TransactionManager>>,
    routing: Arc<RoutingTable>,
    open: ScopedSlot<Vec<String>>,
}

impl TransactionMiddleware {
    /// Creates the stage with no resources.
    #[must_use]
    pub fn new(routing: Arc<RoutingTable>) -> Self {
        Self {
            managers: IndexMap::new(),
            routing,
            open: ScopedSlot::new(Vec::new()),
        }
    }

    /// Registers the transaction manager of `resource`.
    #[must_use]
    pub fn manager(mut self, resource: impl Into<String>, manager: Arc<dyn TransactionManager>) -> Self {
        self.managers.insert(resource.into(), manager);
        self
    }

    /// Resources with a transaction currently open, outermost first.
    #[must_use]
    pub fn open_resources(&self) -> Vec<String> {
        self.open.get()
    }

    fn applies(&self, envelope: &Envelope) -> bool {
        let enabled = envelope.last::<TransactionalStamp>().is_some_and(|stamp| stamp.enabled);
        enabled && (envelope.has::<ReceivedStamp>() || self.routing.senders_for(envelope.message_name()).is_empty())
    }

    async fn dispatch(&self, ctx: &mut DispatchContext, envelope: Envelope, next: Next<'_>) -> DispatchResult {
        if !self.applies(&envelope) {
            return next.run(ctx, envelope).await;
        }

        let resource = envelope
            .last::<TransactionalStamp>()
            .and_then(|stamp| stamp.resource.clone())
            .unwrap_or_else(|| DEFAULT_RESOURCE.to_string());
        let manager = self.managers.get(&resource).ok_or_else(|| {
            CourierError::config(format!("no transaction manager for resource \"{resource}\""))
        })?;

        let mut open = self.open.get();
        if open.contains(&resource) {
            debug!(resource = %resource, "joining open transaction");
            return next.run(ctx, envelope).await;
        }

        manager.begin().await.map_err(|source| {
            CourierError::transport_with_source(format!("could not begin transaction on \"{resource}\""), source)
        })?;
        debug!(resource = %resource, "transaction started");

        open.push(resource.clone());
        let result = self.open.scope(open, next.run(ctx, envelope)).await;

        match result {
            Ok(envelope) => {
                manager.commit().await.map_err(|source| {
                    CourierError::transport_with_source(format!("could not commit transaction on \"{resource}\""), source)
                })?;
                debug!(resource = %resource, "transaction committed");
                Ok(envelope)
            }
            Err(error) => {
                match manager.rollback().await {
                    Ok(()) => debug!(resource = %resource, "transaction rolled back"),
                    Err(rollback) => warn!(
                        resource = %resource,
                        error = %rollback,
                        "rollback failed"
                    ),
                }
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for TransactionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionMiddleware")
            .field("resources", &self.managers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Middleware for TransactionMiddleware {
    fn name(&self) -> &'static str {
        "transaction"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(self.dispatch(ctx, envelope, next))
    }
}
