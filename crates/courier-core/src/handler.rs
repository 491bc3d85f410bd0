//! Handler resolution seam.
//!
//! The terminal step of the pipeline hands the envelope to a
//! [`HandlerResolver`], which runs whatever application handlers are bound to
//! the message and reports one [`HandlerOutcome`] per handler.
//!
//! [`HandlerRegistry`] is a closure-based resolver suitable for applications
//! that register handlers at startup.

use crate::envelope::Envelope;
use crate::error::BoxError;
use crate::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// The result of one handler invocation.
#[derive(Debug)]
pub struct HandlerOutcome {
    /// The handler identifier.
    pub handler: String,
    /// The handler's return value or failure.
    pub result: Result<Value, BoxError>,
}

impl HandlerOutcome {
    /// A successful invocation.
    pub fn ok(handler: impl Into<String>, value: Value) -> Self {
        Self {
            handler: handler.into(),
            result: Ok(value),
        }
    }

    /// A failed invocation.
    pub fn failed(handler: impl Into<String>, error: impl Into<BoxError>) -> Self {
        Self {
            handler: handler.into(),
            result: Err(error.into()),
        }
    }
}

/// Resolves and invokes the handlers for a message.
pub trait HandlerResolver: Send + Sync {
    /// Runs every handler bound to the envelope's message.
    ///
    /// An empty result means no handler is bound.
    fn resolve<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Vec<HandlerOutcome>>;
}

type HandlerFn = Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// A registry of handler closures keyed by message name.
///
/// # Example
///
/// ```
/// use courier_core::{Envelope, HandlerRegistry, HandlerResolver, Message};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let registry = HandlerRegistry::new().register("Ping", "pong", |_env| async {
///     Ok(json!("pong"))
/// });
///
/// let envelope = Envelope::new(Message::new("Ping", json!({})));
/// let outcomes = registry.resolve(&envelope).await;
/// assert_eq!(outcomes.len(), 1);
/// assert_eq!(outcomes[0].handler, "pong");
/// # });
/// ```
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: IndexMap<String, Vec<(String, HandlerFn)>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to a message name.
    ///
    /// Several handlers may be bound to the same message; they run in
    /// registration order.
    #[must_use]
    pub fn register<F, Fut>(mut self, message: impl Into<String>, handler: impl Into<String>, f: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let f: HandlerFn = Arc::new(move |envelope| Box::pin(f(envelope)));
        self.handlers
            .entry(message.into())
            .or_default()
            .push((handler.into(), f));
        self
    }

    /// Returns the handler names bound to a message.
    #[must_use]
    pub fn handler_names(&self, message: &str) -> Vec<&str> {
        self.handlers
            .get(message)
            .map(|bound| bound.iter().map(|(name, _)| name.as_str()).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: IndexMap<&str, Vec<&str>> = self
            .handlers
            .iter()
            .map(|(message, bound)| (message.as_str(), bound.iter().map(|(n, _)| n.as_str()).collect()))
            .collect();
        f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, Vec<HandlerOutcome>> {
        Box::pin(async move {
            let Some(bound) = self.handlers.get(envelope.message_name()) else {
                return Vec::new();
            };

            let mut outcomes = Vec::with_capacity(bound.len());
            for (name, handler) in bound {
                let result = handler(envelope.clone()).await;
                outcomes.push(HandlerOutcome {
                    handler: name.clone(),
                    result,
                });
            }
            outcomes
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use serde_json::json;

    #[tokio::test]
    async fn test_unbound_message_has_no_outcomes() {
        let registry = HandlerRegistry::new();
        let envelope = Envelope::new(Message::new("Ping", json!({})));
        assert!(registry.resolve(&envelope).await.is_empty());
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let registry = HandlerRegistry::new()
            .register("Ping", "first", |_| async { Ok(json!(1)) })
            .register("Ping", "second", |_| async { Err::<Value, BoxError>("boom".into()) });

        assert_eq!(registry.handler_names("Ping"), vec!["first", "second"]);

        let envelope = Envelope::new(Message::new("Ping", json!({})));
        let outcomes = registry.resolve(&envelope).await;
        assert_eq!(outcomes[0].handler, "first");
        assert_eq!(outcomes[0].result.as_ref().unwrap(), &json!(1));
        assert!(outcomes[1].result.is_err());
    }
}
