//! Keyed atomic counters.
//!
//! Counters back the backlog accounting: the send side increments
//! `backlog:{transport}:{message}` when a message is enqueued and the receive
//! side decrements it when the message is taken off the queue.
//!
//! Implementations shared by several processes must make `delta` atomic at the
//! storage layer (e.g. `INCRBY`). [`InMemoryCounter`] is atomic per key within
//! one process.

use crate::error::CourierResult;
use crate::BoxFuture;
use dashmap::DashMap;

/// Builds the counter key tracking the backlog of `message` on `transport`.
#[must_use]
pub fn backlog_key(transport: &str, message: &str) -> String {
    format!("backlog:{transport}:{message}")
}

/// Atomic increment/decrement/read keyed by string.
pub trait Counter: Send + Sync {
    /// Adds `delta` to the value at `key` and returns the post-update value.
    fn delta<'a>(&'a self, key: &'a str, delta: i64) -> BoxFuture<'a, CourierResult<i64>>;

    /// Returns the value at `key`, `0` if it was never touched or was cleared.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CourierResult<i64>>;

    /// Removes `key`.
    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CourierResult<()>>;
}

/// In-process counter backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryCounter {
    values: DashMap<String, i64>,
}

impl InMemoryCounter {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every key and value.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let mut entries: Vec<_> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort();
        entries
    }

    fn apply(&self, key: &str, delta: i64) -> i64 {
        // The entry guard holds the shard lock for the read-modify-write.
        let mut entry = self.values.entry(key.to_string()).or_insert(0);
        *entry += delta;
        *entry
    }
}

impl Counter for InMemoryCounter {
    fn delta<'a>(&'a self, key: &'a str, delta: i64) -> BoxFuture<'a, CourierResult<i64>> {
        let value = self.apply(key, delta);
        Box::pin(async move { Ok(value) })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CourierResult<i64>> {
        let value = self.values.get(key).map_or(0, |entry| *entry);
        Box::pin(async move { Ok(value) })
    }

    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CourierResult<()>> {
        self.values.remove(key);
        Box::pin(async { Ok(()) })
    }
}
