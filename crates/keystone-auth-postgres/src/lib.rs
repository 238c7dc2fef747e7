//! PostgreSQL storage backend for Keystone Auth
//!
//! Provides persistent storage for:
//!
//! - Refresh credentials (`tokens` table)
//! - The user directory (`users` table)
//!
//! Every statement runs through the scoped [`DbSession`] of the caller, so
//! reads and writes follow the writer/reader routing and the caller's unit of
//! work decides when writes commit. Outside of any session scope each call
//! runs as its own [`standalone`] unit.
//!
//! # Example
//!
//! ```ignore
//! use keystone_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::new(session_context);
//! let tokens = TokenService::new(jwt, Arc::new(storage.tokens()), lifetimes);
//! ```

pub mod token;
pub mod user;

use std::future::Future;
use std::sync::Arc;

use keystone_auth::AuthError;
use keystone_db_postgres::{DbError, DbSession, SessionContext, standalone};

pub use token::PostgresTokenStorage;
pub use user::PostgresUserStorage;

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Resource already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value could not be mapped back to its domain type.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidData` error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Maps unique violations to `Conflict`, keeping other errors as is.
    fn from_insert(err: DbError, what: &str) -> Self {
        if err.is_unique_violation() {
            Self::conflict(format!("{what} already exists"))
        } else {
            Self::Database(err)
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Auth storage failure");
        AuthError::storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// PostgreSQL storage backend for authentication data.
///
/// Holds the session context and hands out the storage types.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    ctx: SessionContext,
}

impl PostgresAuthStorage {
    /// Create new storage over an existing session context.
    #[must_use]
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// The session context statements run through.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Get token storage operations.
    #[must_use]
    pub fn tokens(&self) -> PostgresTokenStorage {
        PostgresTokenStorage::new(self.ctx.clone())
    }

    /// Get user storage operations.
    #[must_use]
    pub fn users(&self) -> PostgresUserStorage {
        PostgresUserStorage::new(self.ctx.clone())
    }
}

/// Runs `op` on the ambient session, or as a standalone unit when no scope
/// is active.
pub(crate) async fn with_session<T, F, Fut>(ctx: &SessionContext, op: F) -> StorageResult<T>
where
    F: FnOnce(Arc<DbSession>) -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    match ctx.current() {
        Ok(session) => op(session).await,
        Err(err) if err.is_scope_error() => {
            standalone(ctx, || async { op(ctx.current()?).await }).await
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_conflict() {
        let err = StorageError::conflict("token already exists");
        assert!(err.is_conflict());
        assert!(!err.is_database_error());
        assert_eq!(err.to_string(), "Conflict: token already exists");
    }

    #[test]
    fn test_insert_error_mapping() {
        let err = StorageError::from_insert(DbError::NoSessionScope, "token");
        assert!(err.is_database_error());
    }

    #[test]
    fn test_into_auth_error() {
        let err: AuthError = StorageError::invalid_data("authority 'ROOT'").into();
        assert!(matches!(err, AuthError::Storage { .. }));
        assert!(err.is_server_error());
    }
}
