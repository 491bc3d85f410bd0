//! Backlog accounting on receipt.
//!
//! The send stage increments `backlog:{transport}:{message}` for every
//! envelope it enqueues. When a worker receives the envelope, this stage
//! decrements the same key before handling it, so the counter tracks how many
//! messages of each type wait on each transport.
//!
//! The transport is the alias of the last [`SentStamp`], falling back to the
//! transport named by the [`ReceivedStamp`].

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use courier_core::stamp::{ReceivedStamp, SentStamp};
use courier_core::{backlog_key, BoxFuture, Counter, Envelope};
use std::sync::Arc;
use tracing::{debug, warn};

/// Decrements the backlog counter of received envelopes.
#[derive(Clone)]
pub struct BacklogMiddleware {
    counter: Arc<dyn Counter>,
}

impl BacklogMiddleware {
    /// Creates the stage over `counter`.
    #[must_use]
    pub fn new(counter: Arc<dyn Counter>) -> Self {
        Self { counter }
    }

    /// The backlog key a received envelope is accounted under, if received.
    #[must_use]
    pub fn key_for(envelope: &Envelope) -> Option<String> {
        let received = envelope.last::<ReceivedStamp>()?;
        let transport = envelope
            .last::<SentStamp>()
            .map_or(received.transport_name.as_str(), |sent| sent.sender_alias.as_str());
        Some(backlog_key(transport, envelope.message_name()))
    }
}

impl std::fmt::Debug for BacklogMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacklogMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for BacklogMiddleware {
    fn name(&self) -> &'static str {
        "backlog"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult> {
        Box::pin(async move {
            if let Some(key) = Self::key_for(&envelope) {
                match self.counter.delta(&key, -1).await {
                    Ok(remaining) => debug!(key = %key, remaining, "backlog slot released"),
                    Err(error) => warn!(key = %key, error = %error, "could not update backlog counter"),
                }
            }
            next.run(ctx, envelope).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnTerminal;
    use crate::pipeline::Pipeline;
    use courier_core::{CourierError, InMemoryCounter, Message};
    use serde_json::json;

    #[test]
    fn test_key_prefers_sender_alias() {
        let envelope = Envelope::new(Message::new("Foo", json!({})));
        assert_eq!(BacklogMiddleware::key_for(&envelope), None);

        let received = envelope.with(ReceivedStamp::new("jobs"));
        assert_eq!(BacklogMiddleware::key_for(&received).as_deref(), Some("backlog:jobs:Foo"));

        let sent = received.with(SentStamp::new("natsB"));
        assert_eq!(BacklogMiddleware::key_for(&sent).as_deref(), Some("backlog:natsB:Foo"));
    }

    #[tokio::test]
    async fn test_decrements_before_handling() {
        let counter = Arc::new(InMemoryCounter::new());
        counter.delta("backlog:natsB:Foo", 2).await.unwrap();

        let pipeline = Pipeline::builder().stage(BacklogMiddleware::new(counter.clone())).build();
        let counter_view = Arc::clone(&counter);
        let terminal = FnTerminal::new(move |env: Envelope| {
            let counter_view = Arc::clone(&counter_view);
            async move {
                assert_eq!(counter_view.get("backlog:natsB:Foo").await?, 1);
                Ok::<_, CourierError>(env)
            }
        });

        let received = Envelope::new(Message::new("Foo", json!({})))
            .with(SentStamp::new("natsB"))
            .with(ReceivedStamp::new("natsB"));
        let mut ctx = DispatchContext::new("bus", "Foo");
        pipeline.dispatch(&mut ctx, received, &terminal).await.unwrap();

        let unreceived = Envelope::new(Message::new("Foo", json!({})));
        pipeline.dispatch(&mut ctx, unreceived, &terminal).await.unwrap();
        assert_eq!(counter.get("backlog:natsB:Foo").await.unwrap(), 1);
    }
}
