//! Cache-aside for query results.
//!
//! Message types whose route carries a caching [`CachePolicy`] and no senders
//! are answered from the cache store when possible. On a miss the rest of the
//! chain runs and the single handler result is stored under the policy's key
//! (default `{message}:{fingerprint}`) with its tags and TTL. A hit returns
//! the envelope stamped with a [`HandledStamp`] from the `cache` handler,
//! without running any handler.
//!
//! After a successful local handling, the policy's `invalidate_tags` are
//! invalidated. Envelopes that were only sent to a transport invalidate
//! nothing until a worker handles them.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use courier_core::stamp::{HandledStamp, ReceivedStamp, SentStamp};
use courier_core::{BoxFuture, CacheItem, CachePolicy, CacheStore, CourierError, Envelope, RoutingTable};
use std::sync::Arc;
use tracing::debug;

/// Handler name of results served from the cache.
pub const CACHE_HANDLER: &str = "cache";

/// Serves cached query results and invalidates tags after commands.
#[derive(Clone)]
pub struct CacheMiddleware {
    store: Arc<dyn CacheStore>,
    routing: Arc<RoutingTable>,
}

impl CacheMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, routing: Arc<RoutingTable>) -> Self {
        Self { store, routing }
    }

    /// The cache key of an envelope under `policy`.
    #[must_use]
    pub fn key_for(policy: &CachePolicy, envelope: &Envelope) -> String {
        policy.key.clone().unwrap_or_else(|| {
            format!("{}:{}", envelope.message_name(), envelope.message().fingerprint())
        })
    }

    async fn cached(
        &self,
        policy: &CachePolicy,
        ctx: &mut DispatchContext,
        envelope: Envelope,
        next: Next<'_>,
    ) -> DispatchResult {
        let key = Self::key_for(policy, &envelope);
        let mut computed: Option<Envelope> = None;

        let value = {
            let slot = &mut computed;
            let request = envelope.clone();
            let compute = async move {
                let handled = next.run(ctx, request).await?;
                let result = single_result(&handled)?;
                *slot = Some(handled);
                Ok(CacheItem::new(result)
                    .with_tags(policy.tags.clone())
                    .with_ttl(policy.ttl()))
            };
            self.store.get(&key, Box::pin(compute)).await?
        };

        match computed {
            Some(handled) => {
                debug!(key = %key, "cache miss, result stored");
                Ok(handled)
            }
            None => {
                debug!(key = %key, "cache hit");
                Ok(envelope.with(HandledStamp::new(value, CACHE_HANDLER)))
            }
        }
    }

    async fn dispatch(&self, ctx: &mut DispatchContext, envelope: Envelope, next: Next<'_>) -> DispatchResult {
        let Some(route) = self.routing.route(envelope.message_name()) else {
            return next.run(ctx, envelope).await;
        };
        let Some(policy) = route.cache.as_ref() else {
            return next.run(ctx, envelope).await;
        };

        let local = route.senders.is_empty() || envelope.has::<ReceivedStamp>();
        let handled = if policy.caches_results() && local {
            self.cached(policy, ctx, envelope, next).await?
        } else {
            next.run(ctx, envelope).await?
        };

        let handled_here = handled.has::<ReceivedStamp>() || !handled.has::<SentStamp>();
        if !policy.invalidate_tags.is_empty() && handled_here {
            self.store.invalidate_by_tag(&policy.invalidate_tags).await?;
            debug!(tags = ?policy.invalidate_tags, "cache tags invalidated");
        }
        Ok(handled)
    }
}

fn single_result(envelope: &Envelope) -> Result<serde_json::Value, CourierError> {
    match envelope.all::<HandledStamp>().as_slice() {
        [stamp] => Ok(stamp.result.clone()),
        stamps => Err(CourierError::logic(format!(
            "cannot cache \"{}\": expected exactly one handler result, got {}",
            envelope.message_name(),
            stamps.len()
        ))),
    }
}

impl std::fmt::Debug for CacheMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "cache"
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
