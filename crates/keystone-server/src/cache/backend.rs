//! Cache backend with L1 (DashMap) and optional L2 (Redis) tiers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use super::pubsub::{self, CacheInvalidationListener};
use crate::config::RedisConfig;

/// How long an entry promoted from Redis stays in L1.
const PROMOTED_TTL: Duration = Duration::from_secs(30);

/// Keys fetched per `SCAN` round trip during prefix deletion.
const SCAN_BATCH: usize = 100;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Two-tier cache backend.
///
/// - **Local**: single instance, DashMap only
/// - **Redis**: DashMap L1 in front of a shared Redis L2
///
/// Redis failures never fail the caller. A failed read is a miss and a
/// failed write or delete is logged and dropped. Deletes are published so
/// other instances evict their L1 copies.
#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<DashMap<String, CachedEntry>>),
    Redis {
        redis: Pool,
        local: Arc<DashMap<String, CachedEntry>>,
    },
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(redis_pool: Pool) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
        }
    }

    fn local(&self) -> &DashMap<String, CachedEntry> {
        match self {
            CacheBackend::Local(map) => map,
            CacheBackend::Redis { local, .. } => local,
        }
    }

    /// The L1 map shared with the invalidation listener, in Redis mode.
    pub fn local_cache(&self) -> Option<&Arc<DashMap<String, CachedEntry>>> {
        match self {
            CacheBackend::Local(_) => None,
            CacheBackend::Redis { local, .. } => Some(local),
        }
    }

    fn local_get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let local = self.local();
        let entry = local.get(key)?;
        if entry.is_expired() {
            drop(entry);
            local.remove(key);
            return None;
        }
        Some(Arc::clone(&entry.data))
    }

    /// Looks `key` up in L1, then L2. L2 hits are promoted to L1.
    pub async fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        if let Some(data) = self.local_get(key) {
            tracing::debug!(key = %key, "cache hit (L1)");
            return Some(data);
        }

        let CacheBackend::Redis { redis, local } = self else {
            tracing::debug!(key = %key, "cache miss");
            return None;
        };

        let mut conn = match redis.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get Redis connection");
                return None;
            }
        };
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(Some(data)) => {
                tracing::debug!(key = %key, "cache hit (L2)");
                let entry = CachedEntry::new(data, PROMOTED_TTL);
                let data = Arc::clone(&entry.data);
                local.insert(key.to_string(), entry);
                Some(data)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET error");
                None
            }
        }
    }

    /// Stores `value` under `key` for `ttl`.
    ///
    /// Returns once both tiers are written, so a delete issued afterwards
    /// always sees the entry.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let entry = CachedEntry::new(value, ttl);
        let data = Arc::clone(&entry.data);
        self.local().insert(key.to_string(), entry);

        let CacheBackend::Redis { redis, .. } = self else {
            return;
        };
        // Redis rejects SETEX with a zero expiry.
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = match redis.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to get Redis connection");
                return;
            }
        };
        match conn.set_ex::<_, _, ()>(key, data.as_slice(), ttl_secs).await {
            Ok(()) => tracing::debug!(key = %key, ttl_secs, "cache set (L1+L2)"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Redis SET error"),
        }
    }

    pub async fn delete(&self, key: &str) {
        self.local().remove(key);

        if let CacheBackend::Redis { redis, .. } = self {
            match redis.get().await {
                Ok(mut conn) => {
                    if let Err(e) = conn.del::<_, ()>(key).await {
                        tracing::warn!(key = %key, error = %e, "Redis DEL error");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to get Redis connection"),
            }
            if let Err(e) = pubsub::publish_invalidation(redis, pubsub::KEY_CHANNEL, key).await {
                tracing::warn!(key = %key, error = %e, "Cache invalidation not published");
            }
        }
    }

    /// Deletes every key that starts with `<namespace>::`.
    ///
    /// Returns the number of keys removed from L2, or from L1 in local mode.
    pub async fn delete_startswith(&self, namespace: &str) -> usize {
        let prefix = super::key::namespace_prefix(namespace);
        let local = self.local();
        let before = local.len();
        local.retain(|key, _| !key.starts_with(&prefix));
        let removed_local = before.saturating_sub(local.len());

        let CacheBackend::Redis { redis, .. } = self else {
            tracing::debug!(prefix = %prefix, removed = removed_local, "cache prefix invalidated (local)");
            return removed_local;
        };

        let removed = match scan_delete(redis, &prefix).await {
            Ok(removed) => {
                tracing::debug!(prefix = %prefix, removed, "cache prefix invalidated (L1+L2)");
                removed
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Redis prefix delete failed");
                removed_local
            }
        };
        // After the L2 delete, so no other instance can re-promote the entries.
        if let Err(e) = pubsub::publish_invalidation(redis, pubsub::PREFIX_CHANNEL, &prefix).await {
            tracing::warn!(prefix = %prefix, error = %e, "Cache invalidation not published");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.local().len()
    }

    pub fn is_empty(&self) -> bool {
        self.local().is_empty()
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis { .. } => "redis",
        }
    }
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBackend")
            .field("mode", &self.mode())
            .field("l1_entries", &self.len())
            .finish()
    }
}

/// Escapes Redis glob metacharacters so `prefix` matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

async fn scan_delete(redis: &Pool, prefix: &str) -> Result<usize, String> {
    let mut conn = redis.get().await.map_err(|e| e.to_string())?;
    let pattern = format!("{}*", escape_glob(prefix));
    let mut cursor: u64 = 0;
    let mut removed = 0;

    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut conn)
            .await
            .map_err(|e| e.to_string())?;

        if !keys.is_empty() {
            let deleted: usize = conn.del(&keys).await.map_err(|e| e.to_string())?;
            removed += deleted;
        }
        if next == 0 {
            return Ok(removed);
        }
        cursor = next;
    }
}

/// Creates the cache backend from configuration.
///
/// Falls back to a local-only backend when Redis is disabled or unreachable.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Some(Duration::from_millis(config.timeout_ms));
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool. Falling back to local cache.");
            return CacheBackend::new_local();
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            let backend = CacheBackend::new_redis(pool);
            if let Some(local) = backend.local_cache() {
                CacheInvalidationListener {
                    redis_url: config.url.clone(),
                    local_cache: Arc::clone(local),
                }
                .start();
            }
            backend
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis. Falling back to local cache.");
            CacheBackend::new_local()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_set_get_delete() {
        let backend = CacheBackend::new_local();
        backend
            .set("a::x", b"one".to_vec(), Duration::from_secs(60))
            .await;
        assert_eq!(backend.get("a::x").await.unwrap().as_slice(), b"one");

        backend.delete("a::x").await;
        assert!(backend.get("a::x").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let backend = CacheBackend::new_local();
        backend.set("k", b"v".to_vec(), Duration::ZERO).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(backend.get("k").await.is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delete_startswith_matches_namespace_only() {
        let backend = CacheBackend::new_local();
        let ttl = Duration::from_secs(60);
        backend.set("me:1::handlers.me", b"1".to_vec(), ttl).await;
        backend.set("me:1::handlers.other", b"2".to_vec(), ttl).await;
        backend.set("me:10::handlers.me", b"3".to_vec(), ttl).await;

        assert_eq!(backend.delete_startswith("me:1").await, 2);
        assert!(backend.get("me:1::handlers.me").await.is_none());
        assert!(backend.get("me:10::handlers.me").await.is_some());
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("me:1::"), "me:1::");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[tokio::test]
    async fn test_disabled_redis_is_local() {
        let backend = create_cache_backend(&RedisConfig::default()).await;
        assert_eq!(backend.mode(), "local");
    }
}
