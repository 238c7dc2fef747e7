//! Refresh credential storage for PostgreSQL.
//!
//! Rows live in the `tokens` table. Revocation is an `UPDATE` of `is_valid`;
//! nothing here deletes a row.

use async_trait::async_trait;
use keystone_auth::{AuthResult, NewToken, Token, TokenStorage};
use keystone_db_postgres::SessionContext;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use crate::{StorageError, StorageResult, with_session};

type TokenRow = (i64, i64, String, OffsetDateTime, bool);

fn to_token((id, user_id, refresh_token, refresh_expires_at, is_valid): TokenRow) -> Token {
    Token {
        id,
        user_id,
        refresh_token,
        refresh_expires_at,
        is_valid,
    }
}

/// Token storage operations over the scoped session.
#[derive(Debug, Clone)]
pub struct PostgresTokenStorage {
    ctx: SessionContext,
}

impl PostgresTokenStorage {
    #[must_use]
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    async fn insert(&self, token: NewToken) -> StorageResult<Token> {
        with_session(&self.ctx, |session| async move {
            let row: TokenRow = session
                .fetch_one(
                    query_as(
                        r#"
                        INSERT INTO tokens (user_id, refresh_token, refresh_expires_at, is_valid)
                        VALUES ($1, $2, $3, TRUE)
                        RETURNING id, user_id, refresh_token, refresh_expires_at, is_valid
                        "#,
                    )
                    .bind(token.user_id)
                    .bind(token.refresh_token)
                    .bind(token.refresh_expires_at),
                )
                .await
                .map_err(|e| StorageError::from_insert(e, "refresh token"))?;
            Ok(to_token(row))
        })
        .await
    }

    async fn latest_by_refresh_token(&self, refresh_token: &str) -> StorageResult<Option<Token>> {
        with_session(&self.ctx, |session| async move {
            let row: Option<TokenRow> = session
                .fetch_optional(
                    query_as(
                        r#"
                        SELECT id, user_id, refresh_token, refresh_expires_at, is_valid
                        FROM tokens
                        WHERE refresh_token = $1
                        ORDER BY id DESC
                        LIMIT 1
                        "#,
                    )
                    .bind(refresh_token),
                )
                .await?;
            Ok(row.map(to_token))
        })
        .await
    }

    async fn invalidate(&self, user_id: i64) -> StorageResult<u64> {
        with_session(&self.ctx, |session| async move {
            let result = session
                .execute(
                    query("UPDATE tokens SET is_valid = FALSE WHERE user_id = $1 AND is_valid")
                        .bind(user_id),
                )
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn by_user(&self, user_id: i64) -> StorageResult<Vec<Token>> {
        with_session(&self.ctx, |session| async move {
            let rows: Vec<TokenRow> = session
                .fetch_all(
                    query_as(
                        r#"
                        SELECT id, user_id, refresh_token, refresh_expires_at, is_valid
                        FROM tokens
                        WHERE user_id = $1
                        ORDER BY id
                        "#,
                    )
                    .bind(user_id),
                )
                .await?;
            Ok(rows.into_iter().map(to_token).collect())
        })
        .await
    }
}

#[async_trait]
impl TokenStorage for PostgresTokenStorage {
    async fn create(&self, token: NewToken) -> AuthResult<Token> {
        Ok(self.insert(token).await?)
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AuthResult<Option<Token>> {
        Ok(self.latest_by_refresh_token(refresh_token).await?)
    }

    async fn invalidate_all_for_user(&self, user_id: i64) -> AuthResult<u64> {
        let changed = self.invalidate(user_id).await?;
        tracing::debug!(user_id, changed, "Invalidated refresh tokens");
        Ok(changed)
    }

    async fn list_by_user(&self, user_id: i64) -> AuthResult<Vec<Token>> {
        Ok(self.by_user(user_id).await?)
    }
}
