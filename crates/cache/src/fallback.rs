use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{CacheBackend, Result};
use crate::memory::InMemoryCache;

/// Distributed-primary cache with in-process degradation.
///
/// Reads prefer the primary while it reports available; when it is down or
/// erroring, the local tier answers instead. Writes land in both tiers so the
/// local copy is warm when the primary drops out. TTLs are short enough that
/// the duplicated entries cannot drift meaningfully.
#[derive(Clone)]
pub struct FallbackCache {
    primary: Arc<dyn CacheBackend>,
    local: InMemoryCache,
}

impl FallbackCache {
    /// Creates a fallback cache in front of the given primary backend.
    pub fn new(primary: Arc<dyn CacheBackend>) -> Self {
        Self {
            primary,
            local: InMemoryCache::new(),
        }
    }

    /// Returns the local tier, for sweep timers.
    pub fn local(&self) -> &InMemoryCache {
        &self.local
    }
}

#[async_trait]
impl CacheBackend for FallbackCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        if self.primary.is_available() {
            match self.primary.get(key).await {
                Ok(hit) => return Ok(hit),
                Err(err) => {
                    metrics::counter!("cache_fallbacks_total").increment(1);
                    tracing::warn!(error = %err, key, "primary cache read failed, using local tier");
                }
            }
        }
        self.local.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        if self.primary.is_available()
            && let Err(err) = self.primary.set(key, value.clone(), ttl).await
        {
            tracing::warn!(error = %err, key, "primary cache write failed");
        }
        self.local.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.primary.is_available()
            && let Err(err) = self.primary.delete(key).await
        {
            tracing::warn!(error = %err, key, "primary cache delete failed");
        }
        self.local.delete(key).await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        if self.primary.is_available()
            && let Err(err) = self.primary.clear_prefix(prefix).await
        {
            tracing::warn!(error = %err, prefix, "primary cache prefix clear failed");
        }
        self.local.clear_prefix(prefix).await
    }

    // The fallback tier is always reachable.
    fn is_available(&self) -> bool {
        true
    }
}
