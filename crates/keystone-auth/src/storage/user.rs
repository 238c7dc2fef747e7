//! User directory storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::policy::Authority;
use crate::types::UserRecord;

/// Read access to the user directory.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by login email.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserRecord>>;

    /// Finds a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, user_id: i64) -> AuthResult<Option<UserRecord>>;

    /// Returns the authority of `user_id`, or `None` for an unknown user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_authority(&self, user_id: i64) -> AuthResult<Option<Authority>> {
        Ok(self.find_by_id(user_id).await?.map(|user| user.authority))
    }
}
