//! Refresh credential storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{NewToken, Token};

/// Storage trait for persisted refresh credentials.
///
/// Rows are append-only apart from the `is_valid` flag: revocation is a
/// status flip and nothing here deletes a row.
///
/// # Implementations
///
/// - [`MemoryTokenStorage`](super::MemoryTokenStorage)
/// - `keystone-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Inserts a new valid row and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be stored.
    async fn create(&self, token: NewToken) -> AuthResult<Token>;

    /// Finds the row backing `refresh_token` by exact string match.
    ///
    /// When several rows carry the same value the most recent one is
    /// returned. Rows are returned regardless of validity or expiry; callers
    /// decide whether the row is redeemable.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_refresh_token(&self, refresh_token: &str) -> AuthResult<Option<Token>>;

    /// Marks every currently valid row of `user_id` invalid.
    ///
    /// Returns the number of rows changed; zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn invalidate_all_for_user(&self, user_id: i64) -> AuthResult<u64>;

    /// Lists every row of `user_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_by_user(&self, user_id: i64) -> AuthResult<Vec<Token>>;
}
