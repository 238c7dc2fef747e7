//! Authentication and authorization error types.
//!
//! Every error carries a stable [`ResponseCode`] so that the HTTP layer can
//! render the same machine-readable code regardless of where the error was
//! raised. Errors are `Clone` because authentication failures are stored on the
//! request principal and re-raised later by permission checks.

use std::fmt;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The token is malformed, fails signature verification, or was presented
    /// for the wrong purpose (e.g. an access token sent to the refresh endpoint).
    #[error("Token decode error: {message}")]
    TokenDecode {
        /// Description of why the token could not be decoded.
        message: String,
    },

    /// The token is well-formed but past its expiry, or no valid persisted
    /// refresh credential backs it.
    #[error("Token expired")]
    TokenExpired,

    /// No credential was presented with the request.
    #[error("Authentication required")]
    AuthenticationMissing,

    /// A credential was presented but its authority is insufficient.
    #[error("Authorization denied: {message}")]
    AuthorizationDenied {
        /// Description of the missing authority.
        message: String,
    },

    /// The external identity service rejected our request with a 4xx status.
    #[error("External service client error: {message}")]
    ExternalServiceClient {
        /// Response body or description returned by the service.
        message: String,
    },

    /// The external identity service failed with a 5xx status, timed out, or
    /// could not be reached.
    #[error("External service server error: {message}")]
    ExternalServiceServer {
        /// Response body or transport error description.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `TokenDecode` error.
    #[must_use]
    pub fn token_decode(message: impl Into<String>) -> Self {
        Self::TokenDecode {
            message: message.into(),
        }
    }

    /// Creates a new `AuthorizationDenied` error.
    #[must_use]
    pub fn authorization_denied(message: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            message: message.into(),
        }
    }

    /// Creates a new `ExternalServiceClient` error.
    #[must_use]
    pub fn external_client(message: impl Into<String>) -> Self {
        Self::ExternalServiceClient {
            message: message.into(),
        }
    }

    /// Creates a new `ExternalServiceServer` error.
    #[must_use]
    pub fn external_server(message: impl Into<String>) -> Self {
        Self::ExternalServiceServer {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller is at fault (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TokenDecode { .. }
                | Self::TokenExpired
                | Self::AuthenticationMissing
                | Self::AuthorizationDenied { .. }
        )
    }

    /// Returns `true` if this is a server-side failure (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if this is a token-related error.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::TokenDecode { .. } | Self::TokenExpired)
    }

    /// Returns `true` if the external identity service could not be used.
    #[must_use]
    pub fn is_external_service_error(&self) -> bool {
        matches!(
            self,
            Self::ExternalServiceClient { .. } | Self::ExternalServiceServer { .. }
        )
    }

    /// Returns the stable response code for this error.
    #[must_use]
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::TokenDecode { .. } => ResponseCode::TokenInvalid,
            Self::TokenExpired => ResponseCode::TokenExpired,
            Self::AuthenticationMissing => ResponseCode::NoAuthentication,
            Self::AuthorizationDenied { .. } => ResponseCode::NoAuthority,
            Self::ExternalServiceClient { .. } => ResponseCode::ExternalServiceClientError,
            Self::ExternalServiceServer { .. } => ResponseCode::ExternalServiceServerError,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                ResponseCode::UndefinedError
            }
        }
    }
}

/// Stable machine-readable response codes.
///
/// The numeric values are part of the public API contract and are also used
/// by the external identity service in its `verify` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Request succeeded.
    Ok,
    /// No credential presented.
    NoAuthentication,
    /// Credential lacks the required authority.
    NoAuthority,
    /// Unclassified failure.
    UndefinedError,
    /// Token is malformed or has the wrong purpose.
    TokenInvalid,
    /// Token is expired or revoked.
    TokenExpired,
    /// The external service rejected our request.
    ExternalServiceClientError,
    /// The external service failed or was unreachable.
    ExternalServiceServerError,
}

impl ResponseCode {
    /// Numeric code sent to clients.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoAuthentication => 2001,
            Self::NoAuthority => 2101,
            Self::UndefinedError => 3004,
            Self::TokenInvalid => 4003,
            Self::TokenExpired => 4005,
            Self::ExternalServiceClientError => 5001,
            Self::ExternalServiceServerError => 5002,
        }
    }

    /// Default human-readable message.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "Request succeed",
            Self::NoAuthentication => "No Authentication",
            Self::NoAuthority => "No Authority",
            Self::UndefinedError => "Undefined error",
            Self::TokenInvalid => "Wrong token",
            Self::TokenExpired => "Token is expired",
            Self::ExternalServiceClientError => "External service request wrongly",
            Self::ExternalServiceServerError => "External service error",
        }
    }

    /// Looks up a response code by its numeric value.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        [
            Self::Ok,
            Self::NoAuthentication,
            Self::NoAuthority,
            Self::UndefinedError,
            Self::TokenInvalid,
            Self::TokenExpired,
            Self::ExternalServiceClientError,
            Self::ExternalServiceServerError,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
