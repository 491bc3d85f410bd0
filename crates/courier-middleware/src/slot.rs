//! Task-scoped values for the duration of a dispatch.
//!
//! A [`ScopedSlot`] names a value that a dispatch installs for the future it
//! runs. [`ScopedSlot::scope`] wraps that future; while it is polled,
//! [`ScopedSlot::get`] returns the installed value, and outside it the slot
//! falls back to the enclosing scope or its initial value. Scopes live in a
//! tokio task-local, so the enclosing value comes back however the inner
//! future ends, and two dispatches polled side by side (`tokio::join!`,
//! separate tasks) never observe each other's values.
//!
//! ```
//! use courier_middleware::slot::ScopedSlot;
//!
//! # tokio_test::block_on(async {
//! let slot = ScopedSlot::new(None::<String>);
//! slot.scope(Some("A".to_string()), async {
//!     slot.scope(Some("B".to_string()), async {
//!         assert_eq!(slot.get().as_deref(), Some("B"));
//!     })
//!     .await;
//!     assert_eq!(slot.get().as_deref(), Some("A"));
//! })
//! .await;
//! assert_eq!(slot.get(), None);
//! # });
//! ```
//!
//! Nested scopes inherit every slot of the enclosing one. A task started
//! with `tokio::spawn` starts empty.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Scopes = HashMap<u64, Arc<dyn Any + Send + Sync>>;

tokio::task_local! {
    static SCOPES: Scopes;
}

static NEXT_SLOT: AtomicU64 = AtomicU64::new(0);

/// A value installed per dispatch, read by the stages and handlers it runs.
///
/// Clones share the slot identity.
#[derive(Debug)]
pub struct ScopedSlot<T> {
    id: u64,
    initial: Arc<T>,
}

impl<T> Clone for ScopedSlot<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            initial: Arc::clone(&self.initial),
        }
    }
}

impl<T: Default + Clone + Send + Sync + 'static> Default for ScopedSlot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + Sync + 'static> ScopedSlot<T> {
    /// Creates a slot reading `initial` outside any scope.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            id: NEXT_SLOT.fetch_add(1, Ordering::Relaxed),
            initial: Arc::new(initial),
        }
    }

    /// Returns a copy of the value of the innermost scope.
    #[must_use]
    pub fn get(&self) -> T {
        SCOPES
            .try_with(|scopes| {
                scopes
                    .get(&self.id)
                    .and_then(|value| value.downcast_ref::<T>())
                    .cloned()
            })
            .ok()
            .flatten()
            .unwrap_or_else(|| T::clone(&self.initial))
    }

    /// Runs `future` with `value` installed.
    pub fn scope<F: Future>(&self, value: T, future: F) -> impl Future<Output = F::Output> {
        SCOPES.scope(self.nested(value), future)
    }

    /// Runs `f` with `value` installed.
    pub fn sync_scope<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        SCOPES.sync_scope(self.nested(value), f)
    }

    fn nested(&self, value: T) -> Scopes {
        let mut scopes = SCOPES.try_with(Clone::clone).unwrap_or_default();
        scopes.insert(self.id, Arc::new(value));
        scopes
    }
}
