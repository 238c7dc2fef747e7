//! Token lifecycle: issue, refresh and revoke.

use std::sync::Arc;
use std::time::Duration;

use time::{OffsetDateTime, PrimitiveDateTime};

use super::jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims};
use crate::AuthResult;
use crate::config::TokenLifetimes;
use crate::error::AuthError;
use crate::storage::TokenStorage;
use crate::types::{NewToken, UserRecord};

/// Access and refresh token pair returned by an issuance.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IssuedTokens {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

/// Issues, refreshes and revokes signed tokens.
///
/// Every issuance persists one row through [`TokenStorage`]. Refreshing
/// never rotates the refresh token.
#[derive(Clone)]
pub struct TokenService {
    jwt: JwtService,
    storage: Arc<dyn TokenStorage>,
    lifetimes: TokenLifetimes,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(jwt: JwtService, storage: Arc<dyn TokenStorage>, lifetimes: TokenLifetimes) -> Self {
        Self {
            jwt,
            storage,
            lifetimes,
        }
    }

    /// Returns the JWT codec.
    #[must_use]
    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Returns the configured lifetimes.
    #[must_use]
    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    /// Issues an access/refresh pair for `user_id` and persists the refresh row.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the row cannot be stored. Nothing
    /// is persisted in that case.
    pub async fn issue_token(
        &self,
        user_id: i64,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> AuthResult<IssuedTokens> {
        self.issue(AccessTokenClaims::new(user_id, seconds(access_ttl)), refresh_ttl)
            .await
    }

    /// Issues a pair for a directory user with the configured lifetimes.
    ///
    /// The access token additionally carries the user's group and authority.
    ///
    /// # Errors
    ///
    /// See [`issue_token`](Self::issue_token).
    pub async fn issue_for_user(&self, user: &UserRecord) -> AuthResult<IssuedTokens> {
        let mut claims = AccessTokenClaims::new(
            user.id,
            seconds(self.lifetimes.access_token_lifetime),
        )
        .with_authority(user.authority);
        if let Some(group_id) = user.group_id {
            claims = claims.with_group(group_id);
        }
        self.issue(claims, self.lifetimes.refresh_token_lifetime)
            .await
    }

    async fn issue(
        &self,
        access_claims: AccessTokenClaims,
        refresh_ttl: Duration,
    ) -> AuthResult<IssuedTokens> {
        let user_id = access_claims.user_id;
        let access_token = self.jwt.encode(&access_claims)?;

        let refresh_claims = RefreshTokenClaims::new(seconds(refresh_ttl));
        let refresh_token = self.jwt.encode(&refresh_claims)?;
        // Lifetimes past the representable range clamp to its end.
        let refresh_expires_at = OffsetDateTime::from_unix_timestamp(refresh_claims.exp)
            .unwrap_or_else(|_| PrimitiveDateTime::MAX.assume_utc());

        let row = self
            .storage
            .create(NewToken {
                user_id,
                refresh_token: refresh_token.clone(),
                refresh_expires_at,
            })
            .await?;
        tracing::debug!(user_id, token_id = row.id, "Issued token pair");

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenDecode` if the token is malformed, unverifiable, or
    ///   not a refresh token.
    /// - `AuthError::TokenExpired` if the token is past its expiry, no row
    ///   backs it, the row has been revoked, or the row's expiry is not in
    ///   the future.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        access_ttl: Duration,
    ) -> AuthResult<String> {
        let decoded = self.jwt.decode::<RefreshTokenClaims>(refresh_token)?;
        if !decoded.claims.is_refresh() {
            return Err(AuthError::token_decode("not a refresh token"));
        }

        let row = self
            .storage
            .find_by_refresh_token(refresh_token)
            .await?
            .filter(|row| row.is_redeemable_at(OffsetDateTime::now_utc()))
            .ok_or(AuthError::TokenExpired)?;

        let access_token = self
            .jwt
            .encode(&AccessTokenClaims::new(row.user_id, seconds(access_ttl)))?;
        tracing::debug!(user_id = row.user_id, token_id = row.id, "Refreshed access token");
        Ok(access_token)
    }

    /// Revokes every valid refresh row of `user_id`.
    ///
    /// Idempotent; returns the number of rows revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn revoke_refresh_token(&self, user_id: i64) -> AuthResult<u64> {
        let revoked = self.storage.invalidate_all_for_user(user_id).await?;
        tracing::info!(user_id, revoked, "Revoked refresh tokens");
        Ok(revoked)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("jwt", &self.jwt)
            .field("lifetimes", &self.lifetimes)
            .finish_non_exhaustive()
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
