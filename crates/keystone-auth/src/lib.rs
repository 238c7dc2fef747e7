//! # keystone-auth
//!
//! Authentication and authorization core for Keystone services.
//!
//! This crate provides:
//! - Signed access/refresh token issuance, refresh and revocation
//! - Request authentication against an external identity service or by local decode
//! - Ranked authorities and composable permission checks
//! - Axum middleware that attaches the authenticated principal to each request
//!
//! ## Request flow
//!
//! Authentication never fails a request on its own. [`AuthBackend`] captures
//! decode, expiry and external-service rejections onto the [`Principal`], and
//! the error is only raised when an endpoint's [`PermissionSet`] actually needs
//! it. This keeps unauthenticated endpoints such as health probes reachable.
//!
//! ## Modules
//!
//! - [`config`] - Signing, token lifetime and identity-service configuration
//! - [`token`] - JWT codec and the [`TokenService`] lifecycle
//! - [`storage`] - Storage traits for token rows and the user directory
//! - [`external`] - Client for the external identity service
//! - [`policy`] - Authorities and permission units
//! - [`password`] - Argon2 password hashing
//! - [`middleware`] - Axum authentication and enforcement middleware

pub mod config;
pub mod error;
pub mod external;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{
    AuthConfig, AuthMode, ConfigError, IdentityServiceConfig, SigningConfig, TokenLifetimes,
};
pub use error::{AuthError, ResponseCode};
pub use external::{IdentityClient, VerifyOutcome};
pub use middleware::{
    AuthBackend, AuthState, ExternalVerifier, LocalVerifier, Principal, TokenVerifier,
};
pub use policy::{Authority, Permission, PermissionSet};
pub use storage::{MemoryTokenStorage, MemoryUserStorage, TokenStorage, UserStorage};
pub use token::{
    AccessTokenClaims, IssuedTokens, JwtError, JwtService, RefreshTokenClaims, SigningAlgorithm,
    TokenService,
};
pub use types::{NewToken, Token, UserRecord};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keystone_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, AuthMode};
    pub use crate::error::{AuthError, ResponseCode};
    pub use crate::middleware::{AuthBackend, AuthState, Principal};
    pub use crate::policy::{Authority, Permission, PermissionSet};
    pub use crate::storage::{TokenStorage, UserStorage};
    pub use crate::token::{JwtService, TokenService};
}
