//! Named transports.

use crate::transport::Transport;
use courier_core::{CourierError, CourierResult};
use indexmap::IndexMap;
use std::sync::Arc;

/// Transports keyed by their configured name, in declaration order.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: IndexMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transport.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is already taken.
    pub fn insert(&mut self, name: impl Into<String>, transport: Arc<dyn Transport>) -> CourierResult<()> {
        let name = name.into();
        if self.transports.contains_key(&name) {
            return Err(CourierError::config(format!("transport \"{name}\" is declared twice")));
        }
        self.transports.insert(name, transport);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, transport: Arc<dyn Transport>) -> CourierResult<Self> {
        self.insert(name, transport)?;
        Ok(self)
    }

    /// Returns a transport by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Transport>> {
        self.transports.get(name)
    }

    /// Returns a transport by name, failing with a configuration error.
    pub fn require(&self, name: &str) -> CourierResult<&Arc<dyn Transport>> {
        self.get(name)
            .ok_or_else(|| CourierError::config(format!("unknown transport \"{name}\"")))
    }

    /// Returns true if a transport has this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transports.contains_key(name)
    }

    /// Iterates over `(name, transport)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Transport>)> {
        self.transports.iter().map(|(name, t)| (name.as_str(), t))
    }

    /// Transport names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transports.keys().map(String::as_str)
    }

    /// Number of transports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Returns true if no transport is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("transports", &self.transports.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryTransport;

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = TransportRegistry::new();
        registry.insert("async", Arc::new(InMemoryTransport::new())).unwrap();
        let err = registry.insert("async", Arc::new(InMemoryTransport::new())).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = TransportRegistry::new()
            .with("b", Arc::new(InMemoryTransport::new()))
            .unwrap()
            .with("a", Arc::new(InMemoryTransport::new()))
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(registry.contains("a"));
        assert!(registry.require("c").is_err());
        assert_eq!(registry.len(), 2);
    }
}
