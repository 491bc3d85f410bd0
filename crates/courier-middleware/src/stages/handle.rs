//! The terminal handling step.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Terminal};
use courier_core::stamp::HandledStamp;
use courier_core::{BoxFuture, CourierError, Envelope, HandlerFailure, HandlerResolver};
use std::sync::Arc;
use tracing::debug;

/// Invokes every handler bound to the envelope's message.
///
/// Each successful handler adds a [`HandledStamp`] with its result. If any
/// handler fails, the dispatch fails with [`CourierError::HandlerFailed`]
/// carrying every failure. A message no handler is bound to fails with
/// [`CourierError::NoHandler`] unless `allow_no_handlers` is set.
#[derive(Clone)]
pub struct HandleMessage {
    resolver: Arc<dyn HandlerResolver>,
    allow_no_handlers: bool,
}

impl HandleMessage {
    /// Creates the step over `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            resolver,
            allow_no_handlers: false,
        }
    }

    /// Lets unhandled messages through instead of failing.
    #[must_use]
    pub const fn allow_no_handlers(mut self, allow: bool) -> Self {
        self.allow_no_handlers = allow;
        self
    }

    async fn run(&self, envelope: Envelope) -> DispatchResult {
        let outcomes = self.resolver.resolve(&envelope).await;
        if outcomes.is_empty() {
            if self.allow_no_handlers {
                debug!(message = envelope.message_name(), "no handler, message ignored");
                return Ok(envelope);
            }
            return Err(CourierError::NoHandler {
                message_name: envelope.message_name().to_string(),
            });
        }

        let mut handled = envelope;
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(value) => {
                    debug!(handler = %outcome.handler, "handled");
                    handled = handled.with(HandledStamp::new(value, outcome.handler));
                }
                Err(error) => failures.push(HandlerFailure::new(outcome.handler, error)),
            }
        }

        if failures.is_empty() {
            Ok(handled)
        } else {
            Err(CourierError::HandlerFailed {
                message_name: handled.message_name().to_string(),
                failures,
            })
        }
    }
}

impl std::fmt::Debug for HandleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleMessage")
            .field("allow_no_handlers", &self.allow_no_handlers)
            .finish_non_exhaustive()
    }
}

impl Terminal for HandleMessage {
    fn handle<'a>(&'a self, _ctx: &'a mut DispatchContext, envelope: Envelope) -> BoxFuture<'a, DispatchResult> {
        Box::pin(self.run(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{HandlerRegistry, Message};
    use serde_json::json;

    fn registry() -> Arc<HandlerRegistry> {
        let registry = HandlerRegistry::new()
            .register("Ping", "pong", |_env| async { Ok(json!("pong")) })
            .register("Ping", "echo", |env: Envelope| async move { Ok(env.message().payload().clone()) })
            .register("Fail", "ok", |_env| async { Ok(json!(1)) })
            .register("Fail", "broken", |_env| async { Err("disk full".into()) })
            .register("Fail", "flaky", |_env| async { Err("timeout".into()) });
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_stamps_each_result() {
        let step = HandleMessage::new(registry());
        let mut ctx = DispatchContext::new("bus", "Ping");
        let out = step
            .handle(&mut ctx, Envelope::new(Message::new("Ping", json!({"n": 3}))))
            .await
            .unwrap();
        let handled = out.all::<HandledStamp>();
        assert_eq!(handled.len(), 2);
        assert_eq!(handled[0].handler_name, "pong");
        assert_eq!(handled[1].result, json!({"n": 3}));
    }

    #[tokio::test]
    async fn test_failures_are_collected() {
        let step = HandleMessage::new(registry());
        let mut ctx = DispatchContext::new("bus", "Fail");
        let err = step
            .handle(&mut ctx, Envelope::new(Message::new("Fail", json!({}))))
            .await
            .unwrap_err();
        match err {
            CourierError::HandlerFailed { message_name, failures } => {
                assert_eq!(message_name, "Fail");
                let names: Vec<_> = failures.iter().map(|f| f.handler.as_str()).collect();
                assert_eq!(names, vec!["broken", "flaky"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_handler() {
        let mut ctx = DispatchContext::new("bus", "Nobody");
        let envelope = Envelope::new(Message::new("Nobody", json!({})));

        let err = HandleMessage::new(registry())
            .handle(&mut ctx, envelope.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NoHandler { .. }));

        let out = HandleMessage::new(registry())
            .allow_no_handlers(true)
            .handle(&mut ctx, envelope)
            .await
            .unwrap();
        assert!(!out.has::<HandledStamp>());
    }
}
