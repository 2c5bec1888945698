//! Shared key-value caches.
//!
//! The cache-backed store and the profiler's on/off switch both live in a
//! cache shared by every process. Two media are provided: an in-process map
//! for single-process deployments and tests, and Redis.

pub mod memory;
pub mod redis_client;

use std::sync::Arc;

use async_trait::async_trait;

pub use self::memory::MemoryCache;
pub use self::redis_client::RedisCache;

use crate::config::CacheConfig;
use crate::error::StorageError;

/// Minimal cache surface: string values, no expiry, no enumeration.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key` with no expiration.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Store only if `key` is absent. Returns true when the write happened.
    async fn add(&self, key: &str, value: &str) -> Result<bool, StorageError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Open the configured cache. `"memory"` selects the in-process map,
/// anything else is treated as a Redis URL.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn KeyValueCache>, StorageError> {
    if config.url == "memory" {
        tracing::info!("using in-process cache");
        return Ok(Arc::new(MemoryCache::new()));
    }

    let cache = RedisCache::connect(&config.url, &config.key_prefix).await?;
    tracing::info!(url = %config.url, prefix = %config.key_prefix, "connected to redis");
    Ok(Arc::new(cache))
}
