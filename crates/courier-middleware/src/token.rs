//! The current security context.

use crate::slot::ScopedSlot;
use courier_core::{Principal, SecurityContext};
use std::future::Future;

/// Holds the security context of the dispatch in progress.
///
/// The security stage installs the context carried by an envelope for the
/// duration of its handling. Handlers read the current principal from here;
/// the context is scoped to the dispatch future, so concurrent dispatches on
/// one storage each see their own.
#[derive(Debug, Clone, Default)]
pub struct TokenStorage {
    slot: ScopedSlot<SecurityContext>,
}

impl TokenStorage {
    /// Creates a storage holding the anonymous context.
    #[must_use]
    pub fn new() -> Self {
        Self::with_context(SecurityContext::anonymous())
    }

    /// Creates a storage holding `context`.
    #[must_use]
    pub fn with_context(context: SecurityContext) -> Self {
        Self {
            slot: ScopedSlot::new(context),
        }
    }

    /// Returns the current context.
    #[must_use]
    pub fn current(&self) -> SecurityContext {
        self.slot.get()
    }

    /// Returns the current principal, if any.
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.slot.get().principal
    }

    /// Runs `future` with `context` installed.
    pub fn scope<F: Future>(&self, context: SecurityContext, future: F) -> impl Future<Output = F::Output> {
        self.slot.scope(context, future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_and_restore() {
        let storage = TokenStorage::new();
        assert!(storage.principal().is_none());
        storage
            .scope(SecurityContext::new(Some(Principal::new("alice")), Some("main".into())), async {
                assert_eq!(storage.principal().unwrap().identifier, "alice");
                assert_eq!(storage.current().provider_id.as_deref(), Some("main"));
            })
            .await;
        assert!(storage.principal().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_the_context() {
        let storage = TokenStorage::new();
        let handler_view = storage.clone();
        let seen = storage
            .scope(SecurityContext::new(Some(Principal::new("bob")), None), async {
                handler_view.principal().map(|p| p.identifier)
            })
            .await;
        assert_eq!(seen.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_initial_context_outside_scope() {
        let storage = TokenStorage::with_context(SecurityContext::new(Some(Principal::new("system")), None));
        assert_eq!(storage.principal().unwrap().identifier, "system");
    }
}
