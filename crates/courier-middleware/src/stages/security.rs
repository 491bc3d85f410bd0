//! Security principal propagation.
//!
//! Envelopes carry the principal they were dispatched under in a
//! [`SecurityStamp`], so a message handled later (or by a worker in another
//! process) runs under the same identity.
//!
//! ## Behavior
//!
//! - **No stamp**: the current principal and provider are stamped onto the
//!   envelope. A stamp added here is removed again from the returned envelope.
//! - **Stamp present**: its principal becomes current for the duration of
//!   the dispatch. If it names a principal, the user is reloaded (or
//!   refreshed) from its identity provider first; a provider failure is
//!   logged and handling continues with the principal unresolved.
//!
//! Either way the previous context is restored when the dispatch ends,
//! successfully or not, so nested dispatches unwind like a stack.
//!
//! ## Provider selection
//!
//! The provider of a principal is the first of: the stamp's provider id, the
//! provider of the current context, the provider of the current request's
//! firewall, the configured default, the only registered provider. An id that
//! is not registered is a logic error.

use crate::context::DispatchContext;
use crate::middleware::{DispatchResult, Middleware, Next};
use crate::token::TokenStorage;
use courier_core::stamp::SecurityStamp;
use courier_core::{
    BoxFuture, CourierError, CourierResult, Envelope, FirewallResolver, Principal, SecurityContext, UserProvider,
};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Propagates the security principal across dispatches.
pub struct SecurityMiddleware {
    storage: TokenStorage,
    providers: IndexMap<String, Arc<dyn UserProvider>>,
    firewall: Option<Arc<dyn FirewallResolver>>,
    default_provider: Option<String>,
}

impl SecurityMiddleware {
    /// Creates the stage over `storage`, with no identity provider.
    #[must_use]
    pub fn new(storage: TokenStorage) -> Self {
        Self {
            storage,
            providers: IndexMap::new(),
            firewall: None,
            default_provider: None,
        }
    }

    /// Registers an identity provider.
    #[must_use]
    pub fn provider(mut self, id: impl Into<String>, provider: Arc<dyn UserProvider>) -> Self {
        self.providers.insert(id.into(), provider);
        self
    }

    /// Sets the firewall resolver.
    #[must_use]
    pub fn firewall(mut self, firewall: Arc<dyn FirewallResolver>) -> Self {
        self.firewall = Some(firewall);
        self
    }

    /// Sets the default provider id.
    #[must_use]
    pub fn default_provider(mut self, id: Option<String>) -> Self {
        self.default_provider = id;
        self
    }

    /// The storage holding the current context.
    #[must_use]
    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    fn resolve_provider_id(&self, explicit: Option<&str>, current: &SecurityContext) -> CourierResult<String> {
        if let Some(id) = explicit {
            return Ok(id.to_string());
        }
        if let Some(id) = &current.provider_id {
            return Ok(id.clone());
        }
        if let Some(id) = self.firewall.as_ref().and_then(|f| f.current_provider_id()) {
            return Ok(id);
        }
        if let Some(id) = &self.default_provider {
            return Ok(id.clone());
        }
        if self.providers.len() == 1 {
            if let Some(id) = self.providers.keys().next() {
                return Ok(id.clone());
            }
        }
        Err(CourierError::config(
            "cannot determine the identity provider for the security principal: \
             configure a default provider",
        ))
    }

    async fn resolve_user(&self, principal: Principal, provider_id: &str) -> CourierResult<Principal> {
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| CourierError::logic(format!("unknown identity provider \"{provider_id}\"")))?;

        let loaded = match &principal.user {
            Some(user) => provider.refresh_user(user).await,
            None => provider.load_user_by_identifier(&principal.identifier).await,
        };

        match loaded {
            Ok(user) => Ok(principal.with_user(user)),
            Err(error) => {
                warn!(
                    user = %principal.identifier,
                    provider = provider_id,
                    error = %error,
                    "could not resolve user, continuing unresolved"
                );
                Ok(Principal {
                    user: None,
                    ..principal
                })
            }
        }
    }

    async fn context_for(&self, stamp: &SecurityStamp, current: &SecurityContext) -> CourierResult<SecurityContext> {
        let Some(principal) = stamp.principal.clone() else {
            return Ok(SecurityContext::new(None, stamp.provider_id.clone()));
        };
        let provider_id = self.resolve_provider_id(stamp.provider_id.as_deref(), current)?;
        let principal = self.resolve_user(principal, &provider_id).await?;
        Ok(SecurityContext::new(Some(principal), Some(provider_id)))
    }

    async fn dispatch(&self, ctx: &mut DispatchContext, envelope: Envelope, next: Next<'_>) -> DispatchResult {
        let previous = self.storage.current();

        let (envelope, installed, added) = match envelope.last::<SecurityStamp>().cloned() {
            Some(stamp) => {
                let installed = self.context_for(&stamp, &previous).await?;
                (envelope, installed, false)
            }
            None => {
                let provider_id = match &previous.principal {
                    Some(_) => Some(self.resolve_provider_id(None, &previous)?),
                    None => previous.provider_id.clone(),
                };
                let installed = SecurityContext::new(previous.principal.clone(), provider_id);
                let stamped = envelope.with(SecurityStamp::new(
                    installed.principal.clone(),
                    installed.provider_id.clone(),
                ));
                (stamped, installed, true)
            }
        };

        log_transition(&previous, &installed);
        let result = self.storage.scope(installed.clone(), next.run(ctx, envelope)).await;
        log_transition(&installed, &previous);

        if let Err(error) = &result {
            debug!(user = %installed.log_id(), error = %error, "dispatch failed under principal");
        }
        result.map(|envelope| {
            if added {
                envelope.without_all::<SecurityStamp>()
            } else {
                envelope
            }
        })
    }
}

fn log_transition(from: &SecurityContext, to: &SecurityContext) {
    if Principal::same_identity(from.principal.as_ref(), to.principal.as_ref()) {
        return;
    }
    match (&from.principal, &to.principal) {
        (_, Some(user)) => info!(user = %user.identifier, "logged in as {}", user.identifier),
        (Some(user), None) => info!(user = %user.identifier, "logged out as {}", user.identifier),
        (None, None) => {}
    }
}

impl std::fmt::Debug for SecurityMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityMiddleware")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default_provider", &self.default_provider)
            .field("firewall", &self.firewall.is_some())
            .finish_non_exhaustive()
    }
}

impl Middleware for SecurityMiddleware {
    fn name(&self) -> &'static str {
        "security"
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
