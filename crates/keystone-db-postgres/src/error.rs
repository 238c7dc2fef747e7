//! Error types for session management.

use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors raised by pools, sessions and unit-of-work boundaries.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database or connection error.
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Code asked for the current session outside of a session scope.
    #[error("No session scope is active")]
    NoSessionScope,

    /// The scope id is set but its session has already been removed.
    #[error("Session {id} is not registered")]
    SessionNotFound { id: String },
}

impl DbError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a unique constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Sqlx(e) if has_pg_error_code(e, PG_UNIQUE_VIOLATION))
    }

    /// Returns `true` if the error is about session scoping rather than the database.
    #[must_use]
    pub fn is_scope_error(&self) -> bool {
        matches!(self, Self::NoSessionScope | Self::SessionNotFound { .. })
    }
}

/// Result type alias for session operations.
pub type DbResult<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(DbError::NoSessionScope.is_scope_error());
        assert!(!DbError::config("x").is_scope_error());
        assert!(!DbError::Sqlx(SqlxError::RowNotFound).is_unique_violation());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DbError::NoSessionScope.to_string(),
            "No session scope is active"
        );
        assert_eq!(
            DbError::config("bad url").to_string(),
            "Configuration error: bad url"
        );
    }
}
