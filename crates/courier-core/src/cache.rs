//! Cache store seam.
//!
//! The cache-aside and deduplication middleware consume a [`CacheStore`]
//! through a get-or-compute contract. Persistent backends live outside this
//! workspace; [`InMemoryCacheStore`] is the in-process reference store.

use crate::error::CourierResult;
use crate::BoxFuture;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

/// A freshly computed value plus its storage hints.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    /// The value to store.
    pub value: Value,
    /// Tags the value can later be invalidated by.
    pub tags: Vec<String>,
    /// Time to live, `None` to keep until invalidated.
    pub ttl: Option<Duration>,
}

impl CacheItem {
    /// Creates an untagged item without expiry.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            tags: Vec::new(),
            ttl: None,
        }
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the time to live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Get-or-compute key/value storage with tag invalidation.
pub trait CacheStore: Send + Sync {
    /// Returns the value stored at `key`, running `compute` and storing its
    /// result if the key is absent or expired.
    ///
    /// When two callers race on an absent key, the first stored value wins
    /// and both receive it.
    fn get<'a>(
        &'a self,
        key: &'a str,
        compute: BoxFuture<'a, CourierResult<CacheItem>>,
    ) -> BoxFuture<'a, CourierResult<Value>>;

    /// Removes `key`; returns true if something was removed.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CourierResult<bool>>;

    /// Removes every value tagged with any of `tags`.
    fn invalidate_by_tag<'a>(&'a self, tags: &'a [String]) -> BoxFuture<'a, CourierResult<bool>>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    tags: Vec<String>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process cache store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Returns true if no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    fn store(&self, key: &str, item: CacheItem) -> Value {
        let now = Instant::now();
        let fresh = CacheEntry {
            value: item.value,
            tags: item.tags,
            expires_at: item.ttl.map(|ttl| now + ttl),
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(existing) if existing.get().is_live(now) => existing.get().value.clone(),
            Entry::Occupied(mut existing) => {
                let value = fresh.value.clone();
                existing.insert(fresh);
                value
            }
            Entry::Vacant(vacant) => vacant.insert(fresh).value.clone(),
        }
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
        compute: BoxFuture<'a, CourierResult<CacheItem>>,
    ) -> BoxFuture<'a, CourierResult<Value>> {
        Box::pin(async move {
            if let Some(value) = self.lookup(key) {
                tracing::trace!(key, "cache hit");
                return Ok(value);
            }
            let item = compute.await?;
            Ok(self.store(key, item))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, CourierResult<bool>> {
        let removed = self.entries.remove(key).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn invalidate_by_tag<'a>(&'a self, tags: &'a [String]) -> BoxFuture<'a, CourierResult<bool>> {
        self.entries
            .retain(|_, entry| !entry.tags.iter().any(|tag| tags.contains(tag)));
        Box::pin(async { Ok(true) })
    }
}
