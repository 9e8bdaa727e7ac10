use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors produced by cache backends.
///
/// Callers are expected to swallow these (the cache is an accelerator, not a
/// source of truth); they exist so wrappers like
/// [`FallbackCache`](crate::FallbackCache) can decide when to degrade.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not serve the operation.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Pluggable cache backend.
///
/// Implementations must be thread-safe (Send + Sync). `is_available` lets
/// callers fail over to an in-process map without waiting on a timeout.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Gets a cached value if it exists and hasn't expired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Inserts or updates a value with a time-to-live.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Removes a specific entry.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes all entries whose key starts with the prefix.
    async fn clear_prefix(&self, prefix: &str) -> Result<()>;

    /// Returns true if the backend believes it can serve requests.
    fn is_available(&self) -> bool;
}
