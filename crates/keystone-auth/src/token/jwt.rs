//! JWT token generation and validation.
//!
//! Access and refresh tokens share one symmetric secret and one HMAC
//! algorithm. Refresh tokens are told apart from access tokens by a fixed
//! `sub` marker ([`REFRESH_TOKEN_SUBJECT`]).
//!
//! ## Example
//!
//! ```ignore
//! use keystone_auth::token::jwt::{AccessTokenClaims, JwtService, SigningAlgorithm};
//!
//! let jwt = JwtService::new(b"secret", SigningAlgorithm::HS256);
//! let token = jwt.encode(&AccessTokenClaims::new(42, 60))?;
//! let data = jwt.decode::<AccessTokenClaims>(&token)?;
//! assert_eq!(data.claims.user_id, 42);
//! ```

use std::fmt;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::policy::Authority;

/// `sub` claim value that marks a refresh token.
pub const REFRESH_TOKEN_SUBJECT: &str = "refresh";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// The token is malformed or its signature does not verify.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::DecodingError { message } => AuthError::token_decode(message),
            JwtError::EncodingError { message } => AuthError::internal(message),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported symmetric signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Owning user.
    pub user_id: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Unique token id. Keeps two tokens minted in the same second distinct.
    pub jti: String,

    /// Group the user belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,

    /// Authority of the user at issuance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_authority: Option<Authority>,
}

impl AccessTokenClaims {
    /// Creates claims for `user_id` expiring `expires_in_seconds` from now.
    #[must_use]
    pub fn new(user_id: i64, expires_in_seconds: i64) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            user_id,
            exp: now.saturating_add(expires_in_seconds),
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            group_id: None,
            scope: Vec::new(),
            user_authority: None,
        }
    }

    /// Sets the group id.
    #[must_use]
    pub fn with_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Sets the authority.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.user_authority = Some(authority);
        self
    }

    /// Sets the scopes.
    #[must_use]
    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }
}

/// Refresh token claims.
///
/// A refresh token carries no user identity; the persisted token row maps it
/// back to its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    /// Purpose marker, always [`REFRESH_TOKEN_SUBJECT`] for genuine refresh tokens.
    #[serde(default)]
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: i64,

    /// Unique token id.
    #[serde(default)]
    pub jti: String,
}

impl RefreshTokenClaims {
    /// Creates refresh claims expiring `expires_in_seconds` from now.
    #[must_use]
    pub fn new(expires_in_seconds: i64) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            sub: REFRESH_TOKEN_SUBJECT.to_string(),
            exp: now.saturating_add(expires_in_seconds),
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Returns `true` if the purpose marker identifies a refresh token.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.sub == REFRESH_TOKEN_SUBJECT
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Service for encoding and decoding JWT tokens.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
#[derive(Clone)]
pub struct JwtService {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// Creates a new JWT service from a shared secret.
    #[must_use]
    pub fn new(secret: &[u8], algorithm: SigningAlgorithm) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let header = Header::new(self.algorithm.to_jwt_algorithm());
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// # Errors
    /// Returns `JwtError::Expired` for a valid signature past its expiry and
    /// `JwtError::DecodingError` for anything malformed or unverifiable.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let validation = self.validation(true);
        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Decodes a JWT without validating expiration.
    ///
    /// # Errors
    /// Returns an error if decoding fails (signature is still validated).
    pub fn decode_allow_expired<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<TokenData<T>, JwtError> {
        let validation = self.validation(false);
        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(self.algorithm.to_jwt_algorithm());
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        if !validate_exp {
            validation.required_spec_claims.clear();
        }
        validation
    }
}

impl fmt::Debug for JwtService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
