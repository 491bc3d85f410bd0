//! In-flight deduplication.
//!
//! For envelopes stamped with an enabled [`DeduplicateStamp`], the message
//! fingerprint is claimed in the cache store under `dedupe:{fingerprint}`
//! before the message goes on. A claim is a get-or-compute with a fresh
//! token: whoever stores their token first owns the message, every other
//! dispatch of an identical message is dropped while the claim stands.
//!
//! The claim is released:
//!
//! - when a worker receives the envelope, just before it is handled
//! - right after handling, when the message was handled synchronously
//! - when the dispatch fails

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use courier_core::stamp::{DeduplicateStamp, ReceivedStamp, SentStamp};
use courier_core::{BoxFuture, CacheItem, CacheStore, CourierResult, Envelope};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cache key prefix of deduplication claims.
pub const DEDUPE_KEY_PREFIX: &str = "dedupe:";

/// Drops duplicate in-flight messages.
#[derive(Clone)]
pub struct DeduplicationMiddleware {
    store: Arc<dyn CacheStore>,
}

impl DeduplicationMiddleware {
    /// Creates the stage over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// The claim key of an envelope's message.
    #[must_use]
    pub fn key_for(envelope: &Envelope) -> String {
        format!("{DEDUPE_KEY_PREFIX}{}", envelope.message().fingerprint())
    }

    async fn claim(&self, key: &str) -> CourierResult<bool> {
        let token = Uuid::new_v4().to_string();
        let offered = Value::String(token.clone());
        let held = self
            .store
            .get(key, Box::pin(async move { Ok(CacheItem::new(offered)) }))
            .await?;
        Ok(held.as_str() == Some(token.as_str()))
    }

    async fn release(&self, key: &str) {
        if let Err(error) = self.store.delete(key).await {
            warn!(key, error = %error, "could not release deduplication claim");
        }
    }

    async fn dispatch(&self, ctx: &mut DispatchContext, envelope: Envelope, next: Next<'_>) -> DispatchResult {
        let enabled = envelope.last::<DeduplicateStamp>().is_some_and(|stamp| stamp.enabled);
        if !enabled {
            return next.run(ctx, envelope).await;
        }

        let key = Self::key_for(&envelope);
        if envelope.has::<ReceivedStamp>() {
            self.release(&key).await;
            debug!(key = %key, "released deduplication claim on receipt");
            return next.run(ctx, envelope).await;
        }

        if !self.claim(&key).await? {
            info!(message = envelope.message_name(), key = %key, "duplicate message skipped");
            return Ok(envelope);
        }

        match next.run(ctx, envelope).await {
            Ok(envelope) => {
                if !envelope.has::<SentStamp>() {
                    self.release(&key).await;
                }
                Ok(envelope)
            }
            Err(error) => {
                self.release(&key).await;
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for DeduplicationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeduplicationMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for DeduplicationMiddleware {
    fn name(&self) -> &'static str {
        "deduplicate"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnTerminal;
    use crate::pipeline::Pipeline;
    use courier_core::{CourierError, InMemoryCacheStore, Message};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn deduplicated(payload: Value) -> Envelope {
        Envelope::new(Message::new("Import", payload)).with(DeduplicateStamp::new(true))
    }

    #[tokio::test]
    async fn test_second_send_is_dropped_until_received() {
        let store = Arc::new(InMemoryCacheStore::new());
        let pipeline = Pipeline::builder()
            .stage(DeduplicationMiddleware::new(store.clone()))
            .build();
        let sends = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sends);
        let send = FnTerminal::new(move |env: Envelope| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, CourierError>(env.with(SentStamp::new("async"))) }
        });

        let mut ctx = DispatchContext::new("bus", "Import");
        let first = pipeline.dispatch(&mut ctx, deduplicated(json!({"id": 1})), &send).await.unwrap();
        let second = pipeline.dispatch(&mut ctx, deduplicated(json!({"id": 1})), &send).await.unwrap();
        let other = pipeline.dispatch(&mut ctx, deduplicated(json!({"id": 2})), &send).await.unwrap();

        assert!(first.has::<SentStamp>());
        assert!(!second.has::<SentStamp>());
        assert!(other.has::<SentStamp>());
        assert_eq!(sends.load(Ordering::SeqCst), 2);

        let handle = FnTerminal::new(|env: Envelope| async move { Ok::<_, CourierError>(env) });
        let received = deduplicated(json!({"id": 1})).with(ReceivedStamp::new("async"));
        pipeline.dispatch(&mut ctx, received, &handle).await.unwrap();

        let again = pipeline.dispatch(&mut ctx, deduplicated(json!({"id": 1})), &send).await.unwrap();
        assert!(again.has::<SentStamp>());
        assert_eq!(sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_claim_released_after_sync_handling_and_failure() {
        let store = Arc::new(InMemoryCacheStore::new());
        let pipeline = Pipeline::builder()
            .stage(DeduplicationMiddleware::new(store.clone()))
            .build();
        let handle = FnTerminal::new(|env: Envelope| async move { Ok::<_, CourierError>(env) });
        let fail = FnTerminal::new(|_: Envelope| async move { Err::<Envelope, _>(CourierError::logic("boom")) });

        let mut ctx = DispatchContext::new("bus", "Import");
        pipeline.dispatch(&mut ctx, deduplicated(json!(1)), &handle).await.unwrap();
        assert!(store.is_empty());

        assert!(pipeline.dispatch(&mut ctx, deduplicated(json!(1)), &fail).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unstamped_messages_pass() {
        let store = Arc::new(InMemoryCacheStore::new());
        let pipeline = Pipeline::builder()
            .stage(DeduplicationMiddleware::new(store.clone()))
            .build();
        let send = FnTerminal::new(|env: Envelope| async move { Ok::<_, CourierError>(env.with(SentStamp::new("a"))) });
        let mut ctx = DispatchContext::new("bus", "Import");
        for _ in 0..2 {
            let out = pipeline
                .dispatch(&mut ctx, Envelope::new(Message::new("Import", json!(1))), &send)
                .await
                .unwrap();
            assert!(out.has::<SentStamp>());
        }
        assert!(store.is_empty());
    }

    /// A store that can no longer delete.
    struct Unreachable;

    impl CacheStore for Unreachable {
        fn get<'a>(
            &'a self,
            _key: &'a str,
            compute: BoxFuture<'a, CourierResult<CacheItem>>,
        ) -> BoxFuture<'a, CourierResult<Value>> {
            Box::pin(async move { compute.await.map(|item| item.value) })
        }

        fn delete<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, CourierResult<bool>> {
            Box::pin(async { Err(CourierError::transport("cache unreachable")) })
        }

        fn invalidate_by_tag<'a>(&'a self, _tags: &'a [String]) -> BoxFuture<'a, CourierResult<bool>> {
            Box::pin(async { Ok(false) })
        }
    }

    #[tokio::test]
    async fn test_received_message_handled_when_release_fails() {
        let pipeline = Pipeline::builder()
            .stage(DeduplicationMiddleware::new(Arc::new(Unreachable)))
            .build();
        let handled = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&handled);
        let handle = FnTerminal::new(move |env: Envelope| {
            count.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, CourierError>(env) }
        });

        let received = deduplicated(json!({"id": 1})).with(ReceivedStamp::new("async"));
        let mut ctx = DispatchContext::new("bus", "Import");
        pipeline.dispatch(&mut ctx, received, &handle).await.unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }
}
