//! Axum authentication and permission middleware.
//!
//! [`authenticate`] runs the [`AuthBackend`] once per request and stores the
//! resulting [`Principal`] in the request extensions. [`enforce`] evaluates a
//! [`PermissionSet`] against that principal. Handlers read the principal
//! with the [`Principal`] extractor.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::backend::AuthBackend;
use super::types::Principal;
use crate::error::AuthError;
use crate::policy::PermissionSet;

// =============================================================================
// Auth State
// =============================================================================

/// State required by the [`authenticate`] middleware.
#[derive(Clone, Debug)]
pub struct AuthState {
    /// Backend that authenticates each request.
    pub backend: AuthBackend,
}

impl AuthState {
    /// Creates a new auth state.
    #[must_use]
    pub fn new(backend: AuthBackend) -> Self {
        Self { backend }
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Authenticates the request and attaches a [`Principal`].
///
/// Rejected credentials never fail the request here; they are stored on the
/// principal. Only hard identity-service or storage failures short-circuit
/// with an error response.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = match state.backend.authenticate(request.headers()).await {
        Ok(principal) => principal,
        Err(err) => {
            tracing::error!(error = %err, "Authentication unavailable");
            return err.into_response();
        }
    };

    if let Some(user_id) = principal.user_id {
        tracing::Span::current().record("user_id", user_id);
    }
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// Rejects the request unless every unit of the permission set grants.
///
/// Use with `middleware::from_fn_with_state(permission_set, enforce)` as a
/// route layer, after [`authenticate`] has run.
pub async fn enforce(
    State(permissions): State<PermissionSet>,
    request: Request,
    next: Next,
) -> Response {
    let result = match request.extensions().get::<Principal>() {
        Some(principal) => permissions.check(principal),
        None => permissions.check(&Principal::anonymous(AuthError::AuthenticationMissing)),
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::debug!(error = %err, "Permission denied");
            err.into_response()
        }
    }
}

// =============================================================================
// Extractor
// =============================================================================

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Principal>()
            .cloned()
            .unwrap_or_else(|| Principal::anonymous(AuthError::AuthenticationMissing)))
    }
}
