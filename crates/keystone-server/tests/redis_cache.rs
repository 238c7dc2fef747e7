//! Two-tier cache against a real Redis using testcontainers.
//!
//! **Requirements:** Docker running.
//!
//! Run with: cargo test -p keystone-server --test redis_cache -- --ignored

use std::time::Duration;

use keystone_server::cache::{CacheBackend, CacheManager, CacheScope, create_cache_backend};
use keystone_server::config::RedisConfig;
use keystone_server::handler_signature;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let port = container.get_host_port_ipv4(6379).await.expect("get port");
            (container, format!("redis://127.0.0.1:{port}"))
        })
        .await;
    url.clone()
}

async fn connect() -> CacheBackend {
    let backend = create_cache_backend(&RedisConfig {
        enabled: true,
        url: redis_url().await,
        pool_size: 4,
        timeout_ms: 5000,
    })
    .await;
    assert_eq!(backend.mode(), "redis");
    backend
}

/// Polls until `key` is gone from `backend`'s L1, or gives up.
async fn wait_evicted(backend: &CacheBackend, key: &str) -> bool {
    for _ in 0..100 {
        if backend.local_cache().is_some_and(|l1| !l1.contains_key(key)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_prefix_delete_after_set_leaves_nothing_behind() {
    let writer = connect().await;
    let reader = connect().await;

    writer
        .set("me:41::handlers.me", b"stale".to_vec(), Duration::from_secs(60))
        .await;
    assert_eq!(writer.delete_startswith("me:41").await, 1);

    // A fresh instance with an empty L1 must miss in Redis as well.
    assert!(reader.get("me:41::handlers.me").await.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_prefix_delete_evicts_other_instances_l1() {
    let a = connect().await;
    let b = connect().await;
    // Let both listeners subscribe.
    tokio::time::sleep(Duration::from_millis(200)).await;

    a.set("me:42::handlers.me", b"v".to_vec(), Duration::from_secs(60))
        .await;
    // Promotes the entry into b's L1.
    assert!(b.get("me:42::handlers.me").await.is_some());

    a.delete_startswith("me:42").await;
    assert!(wait_evicted(&b, "me:42::handlers.me").await);
    assert!(b.get("me:42::handlers.me").await.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_key_delete_evicts_other_instances_l1() {
    let a = connect().await;
    let b = connect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    a.set("tag::k", b"v".to_vec(), Duration::from_secs(60)).await;
    assert!(b.get("tag::k").await.is_some());

    a.delete("tag::k").await;
    assert!(wait_evicted(&b, "tag::k").await);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_cached_result_is_gone_after_logout_style_invalidation() {
    let cache = CacheManager::new(connect().await, Duration::from_secs(60));
    let sig = handler_signature!(me, [principal]);
    let scope = CacheScope::prefix("me:43");

    let first: Result<u32, String> = cache.cached(scope.clone(), None, &sig, || async { Ok(1) }).await;
    assert_eq!(first, Ok(1));
    cache.remove_by_prefix("me:43").await;

    let second: Result<u32, String> = cache.cached(scope, None, &sig, || async { Ok(2) }).await;
    assert_eq!(second, Ok(2));
}
