//! Per-dispatch context.
//!
//! A [`DispatchContext`] is created for every dispatch and handed down the
//! middleware chain by mutable reference. It replaces any process-wide "current
//! envelope": whatever a stage needs to know about the dispatch in progress is
//! read from, or stored in, the context.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identifier of one dispatch (UUID v7, time ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchId(Uuid);

impl DispatchId {
    /// Generates a new id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State carried through one dispatch.
///
/// # Example
///
/// ```
/// use courier_middleware::context::DispatchContext;
///
/// #[derive(Debug, PartialEq)]
/// struct Attempt(u32);
///
/// let mut ctx = DispatchContext::new("command.bus", "SendInvoice");
/// ctx.insert(Attempt(2));
///
/// assert_eq!(ctx.message_name(), "SendInvoice");
/// assert_eq!(ctx.get::<Attempt>(), Some(&Attempt(2)));
/// ```
#[derive(Debug)]
pub struct DispatchContext {
    dispatch_id: DispatchId,
    bus_name: String,
    message_name: String,
    depth: usize,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl DispatchContext {
    /// Creates a context for dispatching `message_name` on `bus_name`.
    #[must_use]
    pub fn new(bus_name: impl Into<String>, message_name: impl Into<String>) -> Self {
        Self {
            dispatch_id: DispatchId::new(),
            bus_name: bus_name.into(),
            message_name: message_name.into(),
            depth: 0,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// The dispatch id.
    #[must_use]
    pub const fn dispatch_id(&self) -> DispatchId {
        self.dispatch_id
    }

    /// The bus name.
    #[must_use]
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// The message type being dispatched.
    #[must_use]
    pub fn message_name(&self) -> &str {
        &self.message_name
    }

    /// Sets how many dispatches enclose this one.
    #[must_use]
    pub const fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Number of enclosing dispatches; 0 for a top-level dispatch.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// When the dispatch started.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time elapsed since the dispatch started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension, replacing any previous value of that type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a typed extension.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Removes and returns a typed extension.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = DispatchContext::new("bus", "A");
        let b = DispatchContext::new("bus", "A");
        assert_ne!(a.dispatch_id(), b.dispatch_id());
        assert_eq!(a.dispatch_id().as_uuid().get_version_num(), 7);
        assert_eq!(a.depth(), 0);
        assert_eq!(b.with_depth(2).depth(), 2);
    }

    #[test]
    fn test_extensions() {
        let mut ctx = DispatchContext::new("bus", "A");
        assert!(ctx.get::<u32>().is_none());
        ctx.insert(5u32);
        ctx.insert(6u32);
        assert_eq!(ctx.get::<u32>(), Some(&6));
        assert_eq!(ctx.remove::<u32>(), Some(6));
        assert!(ctx.get::<u32>().is_none());
    }
}
