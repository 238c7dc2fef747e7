//! Response caching.
//!
//! - [`backend`]: local DashMap or DashMap + Redis storage
//! - [`key`]: tags, scopes, handler signatures and key derivation
//! - [`codec`]: JSON for records, MessagePack for everything else
//! - [`manager`]: the cache-aside wrapper handlers call
//! - [`pubsub`]: cross-instance L1 invalidation over Redis Pub/Sub

pub mod backend;
pub mod codec;
pub mod key;
pub mod manager;
pub mod pubsub;

pub use backend::{CacheBackend, CachedEntry, create_cache_backend};
pub use codec::CodecError;
pub use key::{CacheScope, CacheTag, HandlerSignature, KeyMaker, SignatureKeyMaker};
pub use manager::CacheManager;
pub use pubsub::{CacheInvalidationListener, publish_invalidation};
