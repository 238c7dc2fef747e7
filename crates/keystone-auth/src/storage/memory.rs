//! In-memory storage backends.
//!
//! Used by tests and single-node development setups. Both stores are cheap to
//! clone and share their state between clones.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{TokenStorage, UserStorage};
use crate::AuthResult;
use crate::types::{NewToken, Token, UserRecord};

/// In-memory [`TokenStorage`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStorage {
    rows: Arc<RwLock<Vec<Token>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all rows, oldest first.
    pub async fn all(&self) -> Vec<Token> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn create(&self, token: NewToken) -> AuthResult<Token> {
        let row = Token {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: token.user_id,
            refresh_token: token.refresh_token,
            refresh_expires_at: token.refresh_expires_at,
            is_valid: true,
        };
        self.rows.write().await.push(row.clone());
        Ok(row)
    }

    async fn find_by_refresh_token(&self, refresh_token: &str) -> AuthResult<Option<Token>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .rev()
            .find(|row| row.refresh_token == refresh_token)
            .cloned())
    }

    async fn invalidate_all_for_user(&self, user_id: i64) -> AuthResult<u64> {
        let mut rows = self.rows.write().await;
        let mut changed = 0;
        for row in rows
            .iter_mut()
            .filter(|row| row.user_id == user_id && row.is_valid)
        {
            row.is_valid = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn list_by_user(&self, user_id: i64) -> AuthResult<Vec<Token>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// In-memory [`UserStorage`].
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStorage {
    users: Arc<RwLock<HashMap<i64, UserRecord>>>,
}

impl MemoryUserStorage {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub async fn insert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserStorage for MemoryUserStorage {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: i64) -> AuthResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Authority;
    use time::{Duration, OffsetDateTime};

    fn new_token(user_id: i64, value: &str) -> NewToken {
        NewToken {
            user_id,
            refresh_token: value.to_string(),
            refresh_expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let storage = MemoryTokenStorage::new();
        let a = storage.create(new_token(1, "a")).await.unwrap();
        let b = storage.create(new_token(1, "b")).await.unwrap();
        assert!(b.id > a.id);
        assert!(a.is_valid && b.is_valid);
    }

    #[tokio::test]
    async fn test_find_returns_latest_row() {
        let storage = MemoryTokenStorage::new();
        storage.create(new_token(1, "dup")).await.unwrap();
        let latest = storage.create(new_token(2, "dup")).await.unwrap();

        let found = storage.find_by_refresh_token("dup").await.unwrap().unwrap();
        assert_eq!(found.id, latest.id);
        assert!(storage.find_by_refresh_token("none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_valid_rows_of_user() {
        let storage = MemoryTokenStorage::new();
        storage.create(new_token(1, "a")).await.unwrap();
        storage.create(new_token(1, "b")).await.unwrap();
        storage.create(new_token(2, "c")).await.unwrap();

        assert_eq!(storage.invalidate_all_for_user(1).await.unwrap(), 2);
        assert_eq!(storage.invalidate_all_for_user(1).await.unwrap(), 0);

        let rows = storage.all().await;
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().filter(|r| r.user_id == 1).all(|r| !r.is_valid));
        assert!(rows.iter().filter(|r| r.user_id == 2).all(|r| r.is_valid));
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let users = MemoryUserStorage::new();
        users
            .insert(UserRecord {
                id: 3,
                email: "a@b.c".to_string(),
                password_hash: String::new(),
                group_id: None,
                authority: Authority::Admin,
            })
            .await;

        assert_eq!(users.find_by_email("a@b.c").await.unwrap().unwrap().id, 3);
        assert_eq!(
            users.find_authority(3).await.unwrap(),
            Some(Authority::Admin)
        );
        assert_eq!(users.find_authority(4).await.unwrap(), None);
    }
}
