//! The per-request authenticated identity.

use serde::Serialize;

use crate::error::AuthError;
use crate::policy::Authority;

/// Identity attached to a request by [`AuthBackend`](super::AuthBackend).
///
/// Built fresh per request and never persisted. When authentication could
/// not complete, `auth_error` holds the reason and the identity fields stay
/// empty; permission checks raise the stored error when they need it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Authenticated user.
    pub user_id: Option<i64>,

    /// Group of the user.
    pub group_id: Option<i64>,

    /// Ranked role of the user.
    pub authority: Option<Authority>,

    /// Scopes granted by the token.
    pub scopes: Vec<String>,

    /// Deferred authentication failure.
    #[serde(skip)]
    pub auth_error: Option<AuthError>,
}

impl Principal {
    /// An anonymous principal carrying a deferred authentication error.
    #[must_use]
    pub fn anonymous(error: AuthError) -> Self {
        Self {
            auth_error: Some(error),
            ..Self::default()
        }
    }

    /// Returns `true` if a user id was established.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Returns `true` if the token granted `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Human-readable identity for logs.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.user_id {
            Some(id) => format!("USER_ID: {id}"),
            None => "anonymous".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_is_not_authenticated() {
        let principal = Principal::anonymous(AuthError::AuthenticationMissing);
        assert!(!principal.is_authenticated());
        assert_eq!(principal.display_name(), "anonymous");
    }

    #[test]
    fn test_serialization_skips_error() {
        let principal = Principal {
            user_id: Some(4),
            scopes: vec!["read".to_string()],
            ..Principal::default()
        };
        let json = serde_json::to_value(&principal).unwrap();
        assert_eq!(json["user_id"], 4);
        assert!(json.get("auth_error").is_none());
        assert!(principal.has_scope("read"));
        assert!(!principal.has_scope("write"));
    }
}
