use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::CacheBackend;

/// Clonable, error-swallowing handle services read and write through.
///
/// Every operation degrades to a miss or a no-op on failure; a request must
/// never fail because the cache is down. Failures are logged at `warn` and
/// counted, nothing more.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    /// Creates a handle over the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Gets and decodes a cached JSON value. Failures read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::counter!("cache_misses_total").increment(1);
                return None;
            }
            Err(err) => {
                metrics::counter!("cache_errors_total").increment(1);
                tracing::warn!(error = %err, key, "cache read failed");
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                metrics::counter!("cache_hits_total").increment(1);
                Some(value)
            }
            Err(err) => {
                // A corrupt entry is treated as a miss and cleared.
                tracing::warn!(error = %err, key, "discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Encodes and stores a JSON value with a TTL. Failures are logged only.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_vec(value) {
            Ok(raw) => Bytes::from(raw),
            Err(err) => {
                tracing::warn!(error = %err, key, "cache value failed to serialize");
                return;
            }
        };

        if let Err(err) = self.backend.set(key, raw, ttl).await {
            metrics::counter!("cache_errors_total").increment(1);
            tracing::warn!(error = %err, key, "cache write failed");
        }
    }

    /// Removes one entry. Failures are logged only.
    pub async fn delete(&self, key: &str) {
        if let Err(err) = self.backend.delete(key).await {
            tracing::warn!(error = %err, key, "cache delete failed");
        }
    }

    /// Removes all entries under a prefix. Failures are logged only.
    pub async fn clear_prefix(&self, prefix: &str) {
        if let Err(err) = self.backend.clear_prefix(prefix).await {
            tracing::warn!(error = %err, prefix, "cache prefix clear failed");
        }
    }

    /// Returns true if the backend believes it can serve requests.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}
