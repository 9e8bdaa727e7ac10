use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::backend::{CacheBackend, CacheError, Result};

/// In-process cache backed by `DashMap`.
///
/// Each entry stores `(value, inserted_at, ttl)` and is lazily evicted on
/// access; [`evict_expired`](InMemoryCache::evict_expired) sweeps the rest on
/// a timer. Doubles as the fallback tier when the distributed cache is down
/// and as a fault-injection double in tests (`set_available`, `set_failing`).
#[derive(Clone, Default)]
pub struct InMemoryCache {
    inner: Arc<DashMap<String, (Bytes, Instant, Duration)>>,
    unavailable: Arc<AtomicBool>,
    failing: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes all expired entries.
    pub fn evict_expired(&self) {
        self.inner
            .retain(|_, (_, inserted, ttl)| inserted.elapsed() < *ttl);
    }

    /// Marks the backend available or unavailable (test double).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Makes every operation return an error (test double).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(CacheError::Backend("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_failing()?;
        if let Some(entry) = self.inner.get(key) {
            let (value, inserted, ttl) = entry.value();
            if inserted.elapsed() < *ttl {
                return Ok(Some(value.clone()));
            }
            // Expired — drop the read guard before removing
            drop(entry);
            self.inner.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.check_failing()?;
        self.inner
            .insert(key.to_string(), (value, Instant::now(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_failing()?;
        self.inner.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<()> {
        self.check_failing()?;
        self.inner.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::Relaxed)
    }
}
