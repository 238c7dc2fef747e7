//! User directory storage for PostgreSQL.

use async_trait::async_trait;
use keystone_auth::{AuthResult, Authority, UserRecord, UserStorage};
use keystone_db_postgres::SessionContext;
use sqlx_core::query_as::query_as;

use crate::{StorageError, StorageResult, with_session};

type UserRow = (i64, String, String, Option<i64>, String);

const SELECT_BY_EMAIL: &str =
    "SELECT id, email, password_hash, group_id, authority FROM users WHERE email = $1";
const SELECT_BY_ID: &str =
    "SELECT id, email, password_hash, group_id, authority FROM users WHERE id = $1";

#[derive(Clone, Copy)]
enum Lookup<'a> {
    Email(&'a str),
    Id(i64),
}

fn to_user((id, email, password_hash, group_id, authority): UserRow) -> StorageResult<UserRecord> {
    let authority = authority
        .parse::<Authority>()
        .map_err(|e| StorageError::invalid_data(format!("user {id}: {e}")))?;
    Ok(UserRecord {
        id,
        email,
        password_hash,
        group_id,
        authority,
    })
}

/// User storage operations over the scoped session.
#[derive(Debug, Clone)]
pub struct PostgresUserStorage {
    ctx: SessionContext,
}

impl PostgresUserStorage {
    #[must_use]
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    /// Inserts a user.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email is already registered.
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        group_id: Option<i64>,
        authority: Authority,
    ) -> StorageResult<UserRecord> {
        with_session(&self.ctx, |session| async move {
            let row: UserRow = session
                .fetch_one(
                    query_as(
                        r#"
                        INSERT INTO users (email, password_hash, group_id, authority)
                        VALUES ($1, $2, $3, $4)
                        RETURNING id, email, password_hash, group_id, authority
                        "#,
                    )
                    .bind(email)
                    .bind(password_hash)
                    .bind(group_id)
                    .bind(authority.as_str()),
                )
                .await
                .map_err(|e| StorageError::from_insert(e, "user"))?;
            to_user(row)
        })
        .await
    }

    async fn find(&self, by: Lookup<'_>) -> StorageResult<Option<UserRecord>> {
        with_session(&self.ctx, |session| async move {
            let row: Option<UserRow> = match by {
                Lookup::Email(email) => {
                    session
                        .fetch_optional(query_as(SELECT_BY_EMAIL).bind(email))
                        .await?
                }
                Lookup::Id(id) => {
                    session
                        .fetch_optional(query_as(SELECT_BY_ID).bind(id))
                        .await?
                }
            };
            row.map(to_user).transpose()
        })
        .await
    }
}

#[async_trait]
impl UserStorage for PostgresUserStorage {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserRecord>> {
        Ok(self.find(Lookup::Email(email)).await?)
    }

    async fn find_by_id(&self, user_id: i64) -> AuthResult<Option<UserRecord>> {
        Ok(self.find(Lookup::Id(user_id)).await?)
    }
}
