//! Authenticated identity carried across dispatches.
//!
//! A [`Principal`] is the serializable snapshot of "who is acting" that travels
//! inside a [`SecurityStamp`](crate::stamp::SecurityStamp). When the message is
//! received again, the principal's [`User`] is re-resolved against the
//! [`UserProvider`] it came from.

use crate::error::BoxError;
use crate::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A resolved user, as returned by a [`UserProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier within its provider (username, email, id).
    pub identifier: String,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Provider-specific attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl User {
    /// Creates a user without roles or attributes.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            roles: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// The authenticated identity active for a dispatch.
///
/// The principal always knows its identifier. The embedded [`User`] is
/// optional: it is absent when the principal was created from a bare
/// identifier or when resolving the user failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The user identifier this principal authenticates.
    pub identifier: String,
    /// Roles granted to the principal.
    #[serde(default)]
    pub roles: Vec<String>,
    /// The resolved user, if any.
    #[serde(default)]
    pub user: Option<User>,
}

impl Principal {
    /// Creates an unresolved principal for an identifier.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            roles: Vec::new(),
            user: None,
        }
    }

    /// Creates a principal from a resolved user, inheriting its roles.
    #[must_use]
    pub fn from_user(user: User) -> Self {
        Self {
            identifier: user.identifier.clone(),
            roles: user.roles.clone(),
            user: Some(user),
        }
    }

    /// Returns a copy of this principal with the given resolved user.
    #[must_use]
    pub fn with_user(&self, user: User) -> Self {
        Self {
            identifier: self.identifier.clone(),
            roles: user.roles.clone(),
            user: Some(user),
        }
    }

    /// Returns true if the principal carries a resolved user.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.user.is_some()
    }

    /// Returns true if both options denote the same identity.
    ///
    /// Only identifiers are compared: refreshing a user's roles does not
    /// count as an identity change.
    #[must_use]
    pub fn same_identity(a: Option<&Self>, b: Option<&Self>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.identifier == b.identifier,
            _ => false,
        }
    }
}

/// The active security state of a dispatch: principal plus the provider id
/// that principal resolves against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    /// The active principal, `None` when anonymous.
    pub principal: Option<Principal>,
    /// The provider id resolved for this dispatch, cached for nested dispatches.
    pub provider_id: Option<String>,
}

impl SecurityContext {
    /// Creates a context for a principal.
    #[must_use]
    pub fn new(principal: Option<Principal>, provider_id: Option<String>) -> Self {
        Self {
            principal,
            provider_id,
        }
    }

    /// An anonymous context with no cached provider.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns a string identifier suitable for logging.
    #[must_use]
    pub fn log_id(&self) -> String {
        self.principal
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), |p| format!("user:{}", p.identifier))
    }
}

/// Loads and refreshes users for one identity provider.
pub trait UserProvider: Send + Sync {
    /// Loads a user by identifier.
    fn load_user_by_identifier<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<User, BoxError>>;

    /// Re-reads a previously resolved user (roles may have changed).
    fn refresh_user<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<User, BoxError>>;
}

/// Resolves the identity provider configured for the current inbound request.
///
/// Implemented by the embedding application (for instance an HTTP layer that
/// knows which firewall matched the request). Returns `None` outside of a
/// request.
pub trait FirewallResolver: Send + Sync {
    /// Returns the provider id of the current request's firewall, if any.
    fn current_provider_id(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity() {
        let alice = Principal::new("alice");
        let alice_resolved = Principal::from_user(User::new("alice").with_role("admin"));
        let bob = Principal::new("bob");

        assert!(Principal::same_identity(None, None));
        assert!(Principal::same_identity(Some(&alice), Some(&alice_resolved)));
        assert!(!Principal::same_identity(Some(&alice), Some(&bob)));
        assert!(!Principal::same_identity(Some(&alice), None));
    }

    #[test]
    fn test_with_user_keeps_identifier() {
        let principal = Principal::new("alice");
        let resolved = principal.with_user(User::new("alice").with_role("editor"));
        assert!(resolved.is_resolved());
        assert_eq!(resolved.identifier, "alice");
        assert_eq!(resolved.roles, vec!["editor"]);
    }

    #[test]
    fn test_log_id() {
        assert_eq!(SecurityContext::anonymous().log_id(), "anonymous");
        let ctx = SecurityContext::new(Some(Principal::new("u1")), None);
        assert_eq!(ctx.log_id(), "user:u1");
    }

    #[test]
    fn test_principal_serialization() {
        let principal = Principal::from_user(User::new("alice").with_role("admin"));
        let json = serde_json::to_string(&principal).unwrap();
        let parsed: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, principal);
    }
}
