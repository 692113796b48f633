//! Count cache tier.
//!
//! The cache holds derived like totals only. It may be flushed or restarted at
//! any time; the counter service is its sole writer and decides when a cached
//! value may be trusted.
//!
//! Every key carries an [`Epoch`]. Deleting a key advances it, and read-path
//! repopulation goes through [`CountCache::set_if_unchanged`] so a count read
//! before an invalidation can never be written back after it.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"          # or "memory"
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_seconds = 300
//! ```

mod config;
mod keys;
mod lock;
mod remote;
mod store;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use config::{CacheBackend, CacheConfig, DEFAULT_CAPACITY, DEFAULT_TTL_SECS};
pub use keys::{CountKey, DEFAULT_KEY_PREFIX};
pub use remote::RedisCountCache;
pub use store::MemoryCountCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cached value for `{key}` is not a count: `{value}`")]
    Corrupt { key: String, value: String },
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn corrupt(key: &CountKey, value: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            value: value.into(),
        }
    }
}

/// Key to integer cache with an explicit miss signal.
///
/// `Ok(None)` means "not cached"; `Ok(Some(0))` is a meaningful hit.
#[async_trait]
pub trait CountCache: Send + Sync {
    async fn get(&self, key: &CountKey) -> Result<Option<u64>, CacheError>;

    /// Upsert; the backend applies its expiry.
    async fn set(&self, key: &CountKey, value: u64) -> Result<(), CacheError>;

    /// Remove the value and advance the key's epoch.
    ///
    /// Deleting an absent key succeeds and still advances the epoch.
    async fn delete(&self, key: &CountKey) -> Result<(), CacheError>;

    /// Epoch to hand back to [`CountCache::set_if_unchanged`].
    async fn epoch(&self, key: &CountKey) -> Result<Epoch, CacheError>;

    /// Write `value` only if no delete of `key` happened since `seen` was read.
    ///
    /// Returns `false` when the write was refused.
    async fn set_if_unchanged(
        &self,
        key: &CountKey,
        value: u64,
        seen: Epoch,
    ) -> Result<bool, CacheError>;
}

/// Monotonic invalidation counter attached to a cache key.
pub type Epoch = u64;

/// Build the configured backend.
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CountCache>, CacheError> {
    let cache: Arc<dyn CountCache> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCountCache::new(config)),
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheError::unavailable("cache.redis_url is not configured"))?;
            Arc::new(RedisCountCache::connect(url, config.ttl).await?)
        }
    };

    info!(
        backend = config.backend.as_str(),
        ttl_secs = config.ttl_secs(),
        "count cache ready"
    );

    Ok(cache)
}
