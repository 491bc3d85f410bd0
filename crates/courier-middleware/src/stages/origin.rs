//! Origin transport message tracking.
//!
//! While a received envelope is being handled, its transport message id is
//! the "current origin". Any message dispatched from inside that handling is
//! stamped with an [`OriginTransportMessageIdStamp`] naming it, which lets a
//! chain of messages be traced back to the queue message that started it.
//! Outside of any received handling the origin is empty.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use crate::slot::ScopedSlot;
use courier_core::stamp::{OriginTransportMessageIdStamp, ReceivedStamp, TransportMessageIdStamp};
use courier_core::{BoxFuture, Envelope};

/// Stamps nested dispatches with the transport message being handled.
#[derive(Debug, Clone)]
pub struct OriginMiddleware {
    current: ScopedSlot<Option<String>>,
}

impl Default for OriginMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginMiddleware {
    /// Creates the stage with an empty origin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ScopedSlot::new(None),
        }
    }

    /// The transport message id currently being handled, if any.
    #[must_use]
    pub fn current_origin(&self) -> Option<String> {
        self.current.get()
    }
}

impl Middleware for OriginMiddleware {
    fn name(&self) -> &'static str {
        "origin"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(async move {
            if envelope.has::<ReceivedStamp>() {
                let id = envelope.last::<TransportMessageIdStamp>().map(|stamp| stamp.id.clone());
                return self.current.scope(id, next.run(ctx, envelope)).await;
            }

            let envelope = if envelope.has::<OriginTransportMessageIdStamp>() {
                envelope
            } else {
                envelope.with(OriginTransportMessageIdStamp::new(self.current.get()))
            };
            next.run(ctx, envelope).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnTerminal;
    use crate::pipeline::Pipeline;
    use courier_core::{CourierError, Message};
    use serde_json::json;

    #[tokio::test]
    async fn test_top_level_dispatch_has_empty_origin() {
        let pipeline = Pipeline::builder().stage(OriginMiddleware::new()).build();
        let terminal = FnTerminal::new(|env: Envelope| async move { Ok::<_, CourierError>(env) });
        let mut ctx = DispatchContext::new("bus", "A");
        let out = pipeline
            .dispatch(&mut ctx, Envelope::new(Message::new("A", json!({}))), &terminal)
            .await
            .unwrap();
        assert_eq!(out.last::<OriginTransportMessageIdStamp>().unwrap().id, None);
    }

    #[tokio::test]
    async fn test_origin_set_while_handling_received() {
        let origin = OriginMiddleware::new();
        let during = origin.clone();
        let after = origin.clone();
        let pipeline = Pipeline::builder().stage(origin).build();
        let terminal = FnTerminal::new(move |env: Envelope| {
            assert_eq!(during.current_origin().as_deref(), Some("jobs:7"));
            async move { Ok::<_, CourierError>(env) }
        });

        let received = Envelope::new(Message::new("A", json!({})))
            .with(ReceivedStamp::new("jobs"))
            .with(TransportMessageIdStamp::new("jobs:7"));
        let mut ctx = DispatchContext::new("bus", "A");
        let out = pipeline.dispatch(&mut ctx, received, &terminal).await.unwrap();
        assert!(!out.has::<OriginTransportMessageIdStamp>());
        assert_eq!(after.current_origin(), None);
    }
}
