//! Authentication configuration.
//!
//! Covers the shared signing secret, token lifetimes, the authentication mode
//! and the external identity service used in `external` mode.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::token::SigningAlgorithm;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// mode = "external"
///
/// [auth.signing]
/// secret = "change-me"
/// algorithm = "HS256"
///
/// [auth.tokens]
/// access_token_lifetime = "1m"
/// refresh_token_lifetime = "1d"
///
/// [auth.identity]
/// base_url = "http://identity.internal/api/v1/auth"
/// client_id = "keystone"
/// client_secret = "secret"
/// scope = ["read", "write"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// How bearer tokens are verified.
    pub mode: AuthMode,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Access and refresh token lifetimes.
    pub tokens: TokenLifetimes,

    /// External identity service. Required when `mode = "external"`.
    pub identity: Option<IdentityServiceConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Local,
            signing: SigningConfig::default(),
            tokens: TokenLifetimes::default(),
            identity: None,
        }
    }
}

/// Token verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Delegate verification to the external identity service.
    External,
    /// Verify tokens locally with the shared signing secret.
    Local,
}

/// Symmetric signing configuration shared by access and refresh tokens.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Shared HMAC secret.
    pub secret: String,

    /// HMAC algorithm.
    pub algorithm: SigningAlgorithm,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: SigningAlgorithm::HS256,
        }
    }
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &"***")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLifetimes {
    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(60),
            refresh_token_lifetime: Duration::from_secs(24 * 3600),
        }
    }
}

/// External identity service configuration.
#[derive(Clone, Deserialize, Serialize)]
pub struct IdentityServiceConfig {
    /// Base URL; `/verify`, `/token` and `/revoke` are resolved against it.
    pub base_url: Url,

    /// OAuth client id used for HTTP Basic authentication.
    pub client_id: String,

    /// OAuth client secret used for HTTP Basic authentication.
    pub client_secret: String,

    /// Cookie name carrying the refresh token on refresh grants.
    #[serde(default = "default_refresh_token_key")]
    pub refresh_token_key: String,

    /// Scopes requested for server tokens.
    #[serde(default)]
    pub scope: Vec<String>,

    /// Total request timeout.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Connection establishment timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Idle connections kept per host.
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

fn default_refresh_token_key() -> String {
    "refresh_token".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

impl IdentityServiceConfig {
    /// Creates a configuration with default timeouts.
    #[must_use]
    pub fn new(
        base_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token_key: default_refresh_token_key(),
            scope: Vec::new(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl std::fmt::Debug for IdentityServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityServiceConfig")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("refresh_token_key", &self.refresh_token_key)
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the signing secret is empty, a lifetime is
    /// zero, the access lifetime exceeds the refresh lifetime, or external
    /// mode is selected without an identity service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("auth.signing.secret".to_string()));
        }

        if self.tokens.access_token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "access_token_lifetime must be > 0".to_string(),
            ));
        }

        if self.tokens.refresh_token_lifetime < self.tokens.access_token_lifetime {
            return Err(ConfigError::InvalidValue(
                "refresh_token_lifetime must not be shorter than access_token_lifetime"
                    .to_string(),
            ));
        }

        if self.mode == AuthMode::External {
            let Some(identity) = &self.identity else {
                return Err(ConfigError::Missing(
                    "auth.identity (required when auth.mode = \"external\")".to_string(),
                ));
            };
            if identity.client_id.is_empty() {
                return Err(ConfigError::Missing("auth.identity.client_id".to_string()));
            }
            if identity.timeout.is_zero() {
                return Err(ConfigError::InvalidValue(
                    "auth.identity.timeout must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
