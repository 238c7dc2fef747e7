//! Persisted identity records shared by the storage backends.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::policy::Authority;

/// A persisted refresh credential.
///
/// One row is written per issuance. Revocation flips `is_valid`; rows are
/// never deleted so the issuance history stays auditable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Surrogate id, monotonic in insertion order.
    pub id: i64,

    /// Owner of the credential.
    pub user_id: i64,

    /// The encoded refresh token.
    pub refresh_token: String,

    /// Absolute expiry of the refresh credential.
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_expires_at: OffsetDateTime,

    /// Cleared when the user's sessions are revoked.
    pub is_valid: bool,
}

impl Token {
    /// Returns `true` if the row is valid and expires strictly after `now`.
    #[must_use]
    pub fn is_redeemable_at(&self, now: OffsetDateTime) -> bool {
        self.is_valid && self.refresh_expires_at > now
    }
}

/// Values for a token row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewToken {
    /// Owner of the credential.
    pub user_id: i64,
    /// The encoded refresh token.
    pub refresh_token: String,
    /// Absolute expiry of the refresh credential.
    pub refresh_expires_at: OffsetDateTime,
}

/// A user directory entry, as much of it as authentication needs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id.
    pub id: i64,

    /// Login email.
    pub email: String,

    /// PHC-formatted password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Group the user belongs to.
    pub group_id: Option<i64>,

    /// Ranked role.
    pub authority: Authority,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("group_id", &self.group_id)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}
