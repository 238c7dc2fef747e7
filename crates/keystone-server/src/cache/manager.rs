//! Cache-aside wrapper for handlers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use super::backend::CacheBackend;
use super::codec;
use super::key::{CacheScope, CacheTag, HandlerSignature, KeyMaker, SignatureKeyMaker};

/// Computes keys, serves hits and stores successful results.
///
/// # Example
///
/// ```ignore
/// let me = cache
///     .cached(CacheScope::prefix(format!("me:{uid}")), None, &handler_signature!(me), || async {
///         Ok::<_, ApiError>(principal.clone())
///     })
///     .await?;
/// ```
#[derive(Clone)]
pub struct CacheManager {
    backend: CacheBackend,
    key_maker: Arc<dyn KeyMaker>,
    default_ttl: Duration,
}

impl CacheManager {
    pub fn new(backend: CacheBackend, default_ttl: Duration) -> Self {
        Self {
            backend,
            key_maker: Arc::new(SignatureKeyMaker),
            default_ttl,
        }
    }

    pub fn with_key_maker(mut self, key_maker: Arc<dyn KeyMaker>) -> Self {
        self.key_maker = key_maker;
        self
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    pub fn key_for(&self, signature: &HandlerSignature, scope: &CacheScope) -> String {
        self.key_maker.make(signature, scope)
    }

    /// Returns the cached value for `signature` under `scope`, or runs
    /// `handler` and caches its `Ok` result for `ttl` (the default TTL when
    /// `None`).
    ///
    /// Errors are returned as is and never cached. An entry that no longer
    /// decodes is treated as a miss.
    pub async fn cached<T, E, F, Fut>(
        &self,
        scope: impl Into<CacheScope>,
        ttl: Option<Duration>,
        signature: &HandlerSignature,
        handler: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key_for(signature, &scope.into());

        if let Some(bytes) = self.backend.get(&key).await {
            match codec::decode(&bytes) {
                Ok(value) => return Ok(value),
                Err(e) => tracing::warn!(key = %key, error = %e, "Dropping undecodable cache entry"),
            }
        }

        let value = handler().await?;
        match codec::encode(&value) {
            Ok(bytes) => {
                self.backend
                    .set(&key, bytes, ttl.unwrap_or(self.default_ttl))
                    .await
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Result not cached"),
        }
        Ok(value)
    }

    pub async fn remove_by_tag(&self, tag: CacheTag) -> usize {
        self.backend.delete_startswith(tag.as_str()).await
    }

    pub async fn remove_by_prefix(&self, prefix: &str) -> usize {
        self.backend.delete_startswith(prefix).await
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
