//! Request authentication.
//!
//! [`AuthBackend`] turns the `Authorization` header into a [`Principal`].
//! Rejections (missing header, bad scheme, invalid or expired token, 4xx
//! from the identity service) are captured on the principal. Only failures
//! that mean nobody can be authenticated right now (5xx, timeouts,
//! unreachable identity service, storage errors) are returned as `Err`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

use super::types::Principal;
use crate::AuthResult;
use crate::config::{AuthConfig, AuthMode};
use crate::error::AuthError;
use crate::external::{IdentityClient, TokenKind};
use crate::policy::Authority;
use crate::storage::UserStorage;
use crate::token::{AccessTokenClaims, JwtService};

// =============================================================================
// Verifiers
// =============================================================================

/// Decides whether a bearer token is acceptable.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token`.
    ///
    /// # Errors
    ///
    /// Returns `TokenDecode` or `TokenExpired` for a rejected token and an
    /// external-service error when no verdict could be obtained.
    async fn verify(&self, token: &str) -> AuthResult<()>;
}

/// Verifies tokens by asking the external identity service.
#[derive(Debug, Clone)]
pub struct ExternalVerifier {
    client: IdentityClient,
}

impl ExternalVerifier {
    /// Creates a verifier backed by `client`.
    #[must_use]
    pub fn new(client: IdentityClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenVerifier for ExternalVerifier {
    async fn verify(&self, token: &str) -> AuthResult<()> {
        self.client
            .verify(token, TokenKind::AccessToken)
            .await?
            .into_result()
    }
}

/// Verifies tokens locally with the shared signing secret.
#[derive(Debug, Clone)]
pub struct LocalVerifier {
    jwt: JwtService,
}

impl LocalVerifier {
    /// Creates a verifier backed by `jwt`.
    #[must_use]
    pub fn new(jwt: JwtService) -> Self {
        Self { jwt }
    }
}

#[async_trait]
impl TokenVerifier for LocalVerifier {
    async fn verify(&self, token: &str) -> AuthResult<()> {
        self.jwt.decode::<AccessTokenClaims>(token)?;
        Ok(())
    }
}

// =============================================================================
// Payload
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    List(Vec<String>),
    Joined(String),
    #[default]
    Missing,
}

impl ScopeClaim {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(scopes) => scopes,
            Self::Joined(scopes) => scopes.split_whitespace().map(str::to_string).collect(),
            Self::Missing => Vec::new(),
        }
    }
}

/// The claims read from an already verified token.
#[derive(Debug, Deserialize)]
struct Payload {
    user_id: Option<i64>,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    user_authority: Option<String>,
    #[serde(default)]
    scope: ScopeClaim,
}

/// Decodes the payload segment of a JWT without checking the signature.
fn decode_payload(token: &str) -> AuthResult<Payload> {
    let segment = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::token_decode("token has no payload segment"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::token_decode(format!("payload is not base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::token_decode(format!("payload is not valid JSON: {e}")))
}

/// Splits an `Authorization` value into its bearer token.
fn bearer_token(value: &str) -> AuthResult<&str> {
    // Exactly `<scheme> <token>` separated by one space.
    let mut parts = value.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::token_decode("malformed Authorization header"));
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::token_decode("NO_BEARER"));
    }
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::token_decode("NO_TOKEN_VALUE"));
    }
    Ok(token)
}

// =============================================================================
// Backend
// =============================================================================

/// Authenticates requests.
///
/// # Example
///
/// ```ignore
/// let backend = AuthBackend::new(Arc::new(LocalVerifier::new(jwt)))
///     .with_user_storage(users);
/// let principal = backend.authenticate(request.headers()).await?;
/// ```
#[derive(Clone)]
pub struct AuthBackend {
    verifier: Arc<dyn TokenVerifier>,
    users: Option<Arc<dyn UserStorage>>,
}

impl AuthBackend {
    /// Creates a backend with the given verifier.
    #[must_use]
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            users: None,
        }
    }

    /// Builds the verifier selected by `config.mode`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if external mode has no identity
    /// service configured or its client cannot be created.
    pub fn from_config(config: &AuthConfig, jwt: JwtService) -> AuthResult<Self> {
        let verifier: Arc<dyn TokenVerifier> = match config.mode {
            AuthMode::Local => Arc::new(LocalVerifier::new(jwt)),
            AuthMode::External => {
                let identity = config.identity.as_ref().ok_or_else(|| {
                    AuthError::configuration("external auth mode requires auth.identity")
                })?;
                Arc::new(ExternalVerifier::new(IdentityClient::new(identity)?))
            }
        };
        Ok(Self::new(verifier))
    }

    /// Fills in missing authorities from the user directory.
    #[must_use]
    pub fn with_user_storage(mut self, users: Arc<dyn UserStorage>) -> Self {
        self.users = Some(users);
        self
    }

    /// Authenticates a request from its headers.
    ///
    /// # Errors
    ///
    /// Returns an error only when the identity service cannot give a verdict
    /// or the user directory fails. Every other failure is stored in
    /// `Principal::auth_error`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Principal> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(Principal::anonymous(AuthError::AuthenticationMissing));
        };
        let token = match value
            .to_str()
            .map_err(|_| AuthError::token_decode("Authorization header is not ASCII"))
            .and_then(bearer_token)
        {
            Ok(token) => token,
            Err(err) => return Ok(Principal::anonymous(err)),
        };

        match self.verifier.verify(token).await {
            Ok(()) => {}
            Err(err @ AuthError::ExternalServiceServer { .. }) => return Err(err),
            Err(err) if err.is_client_error() || err.is_external_service_error() => {
                tracing::info!(error = %err, "Bearer token rejected");
                return Ok(Principal::anonymous(err));
            }
            Err(err) => return Err(err),
        }

        let payload = match decode_payload(token) {
            Ok(payload) => payload,
            Err(err) => return Ok(Principal::anonymous(err)),
        };

        let mut authority = payload
            .user_authority
            .as_deref()
            .and_then(|name| name.parse::<Authority>().ok());
        if authority.is_none()
            && let (Some(users), Some(user_id)) = (&self.users, payload.user_id)
        {
            authority = users.find_authority(user_id).await?;
        }

        Ok(Principal {
            user_id: payload.user_id,
            group_id: payload.group_id,
            authority,
            scopes: payload.scope.into_vec(),
            auth_error: None,
        })
    }
}

impl std::fmt::Debug for AuthBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBackend")
            .field("user_storage", &self.users.is_some())
            .finish_non_exhaustive()
    }
}
