//! Redis Pub/Sub for cross-instance L1 invalidation.
//!
//! Deleting a key or a namespace removes it from Redis directly, but every
//! other instance still holds its own L1 copy. Each delete is therefore also
//! published, and every instance runs a [`CacheInvalidationListener`] that
//! drops the matching L1 entries.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use deadpool_redis::Pool;
use futures_util::StreamExt;
use redis::AsyncCommands;

use super::backend::CachedEntry;

/// Channel carrying single keys.
pub const KEY_CHANNEL: &str = "keystone:cache:invalidate";

/// Channel carrying namespace prefixes (`<namespace>::`).
pub const PREFIX_CHANNEL: &str = "keystone:cache:invalidate-prefix";

const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Subscribes to both invalidation channels and evicts L1 entries.
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub local_cache: Arc<DashMap<String, CachedEntry>>,
}

impl CacheInvalidationListener {
    /// Spawns the listener. It reconnects with exponential backoff.
    pub fn start(self) {
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                match self.run().await {
                    Ok(()) => backoff = Duration::from_secs(1),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Cache invalidation listener error, reconnecting"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        });
    }

    async fn run(&self) -> Result<(), String> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(&[KEY_CHANNEL, PREFIX_CHANNEL])
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;
        tracing::info!("Subscribed to cache invalidation channels");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            match msg.get_payload::<String>() {
                Ok(payload) => {
                    let channel = msg.get_channel_name();
                    let removed = apply_invalidation(&self.local_cache, channel, &payload);
                    tracing::debug!(channel, payload = %payload, removed, "received cache invalidation");
                }
                Err(e) => tracing::warn!(error = %e, "failed to parse invalidation payload"),
            }
        }
        Err("pub/sub connection closed".to_string())
    }
}

/// Evicts the L1 entries named by one invalidation message.
///
/// Returns the number of entries removed. Unknown channels remove nothing.
pub fn apply_invalidation(
    local: &DashMap<String, CachedEntry>,
    channel: &str,
    payload: &str,
) -> usize {
    match channel {
        KEY_CHANNEL => usize::from(local.remove(payload).is_some()),
        PREFIX_CHANNEL => {
            let before = local.len();
            local.retain(|key, _| !key.starts_with(payload));
            before.saturating_sub(local.len())
        }
        _ => 0,
    }
}

/// Publishes an invalidation to every instance, including this one.
pub async fn publish_invalidation(
    redis: &Pool,
    channel: &str,
    payload: &str,
) -> Result<(), String> {
    let mut conn = redis
        .get()
        .await
        .map_err(|e| format!("failed to get Redis connection: {e}"))?;

    conn.publish::<_, _, ()>(channel, payload)
        .await
        .map_err(|e| format!("failed to publish invalidation: {e}"))?;

    tracing::debug!(channel, payload = %payload, "published cache invalidation");
    Ok(())
}
