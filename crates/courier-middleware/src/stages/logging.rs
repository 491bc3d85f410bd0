//! Dispatch logging and metrics.
//!
//! Opens a `dispatch` span (dispatch id, message, bus) around the rest of the
//! chain, so every log line emitted by later stages and handlers is
//! correlated with the dispatch. Nested dispatches open child spans.
//!
//! On completion it records `courier_messages_dispatched_total` and
//! `courier_dispatch_duration_seconds`.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use courier_core::stamp::{HandledStamp, ReceivedStamp, SentStamp};
use courier_core::{BoxFuture, Envelope};
use courier_telemetry::metrics::{record_dispatch, InFlightGuard, Outcome};
use tracing::{debug, info_span, warn, Instrument};

/// Wraps every dispatch in a span and records its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchLoggingMiddleware;

impl DispatchLoggingMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for DispatchLoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut DispatchContext,
        envelope: Envelope,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult> {
        let span = info_span!(
            "dispatch",
            dispatch_id = %ctx.dispatch_id(),
            message = %ctx.message_name(),
            bus = %ctx.bus_name(),
            depth = ctx.depth(),
            received = envelope.has::<ReceivedStamp>(),
        );

        Box::pin(
            async move {
                let _in_flight = InFlightGuard::new();
                debug!(stamps = envelope.stamps().count(), "dispatch started");

                let result = next.run(ctx, envelope).await;
                let elapsed = ctx.elapsed();
                let duration_ms = elapsed.as_secs_f64() * 1000.0;

                match &result {
                    Ok(envelope) => {
                        debug!(
                            duration_ms,
                            handled = envelope.all::<HandledStamp>().len(),
                            sent = envelope.all::<SentStamp>().len(),
                            "dispatch completed"
                        );
                        record_dispatch(ctx.message_name(), Outcome::Ok, elapsed);
                    }
                    Err(error) => {
                        warn!(
                            duration_ms,
                            category = error.category().as_str(),
                            error = %error,
                            "dispatch failed"
                        );
                        record_dispatch(ctx.message_name(), Outcome::Failed, elapsed);
                    }
                }
                result
            }
            .instrument(span),
        )
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
    async fn test_passes_result_through() {
        let pipeline = Pipeline::builder().stage(DispatchLoggingMiddleware::new()).build();
        let ok = FnTerminal::new(|env: Envelope| async move { Ok::<_, CourierError>(env.with(HandledStamp::new(json!(1), "h"))) });
        let failing = FnTerminal::new(|_: Envelope| async move { Err::<Envelope, _>(CourierError::logic("nope")) });

        let envelope = Envelope::new(Message::new("Ping", json!({})));
        let mut ctx = DispatchContext::new("bus", "Ping");
        let out = pipeline.dispatch(&mut ctx, envelope.clone(), &ok).await.unwrap();
        assert_eq!(out.all::<HandledStamp>().len(), 1);

        let mut ctx = DispatchContext::new("bus", "Ping");
        assert!(pipeline.dispatch(&mut ctx, envelope, &failing).await.is_err());
    }
}
