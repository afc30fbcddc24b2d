//! Bounded in-memory cache with strict LRU eviction.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use super::{CacheLayer, LayerStats};
use crate::observability::metrics;

struct Stored<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Stored<V> {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Fixed-capacity cache; inserting beyond capacity synchronously evicts
/// the least-recently-used entry. Expired entries are dropped on access
/// and count as misses, not evictions.
pub struct MemoryCache<V> {
    inner: Mutex<LruCache<String, Stored<V>>>,
    hits: AtomicU64,
    total: AtomicU64,
    evictions: AtomicU64,
}

impl<V> MemoryCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            total: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> CacheLayer<V> for MemoryCache<V> {
    async fn get(&self, key: &str) -> Option<V> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(stored) if stored.expired() => {
                inner.pop(key);
                None
            }
            Some(stored) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(stored.value.clone())
            }
            None => None,
        }
    }

    async fn has(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner.peek(key).is_some_and(|stored| !stored.expired())
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let stored = Stored {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        let mut inner = self.inner.lock();
        if let Some((evicted_key, _)) = inner.push(key.to_string(), stored) {
            // push returns the displaced LRU pair; same-key replacement
            // is a full overwrite, not an eviction.
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_eviction("memory");
            }
        }
        true
    }

    async fn remove(&self, key: &str) {
        self.inner.lock().pop(key);
    }

    fn stats(&self) -> LayerStats {
        LayerStats {
            hits: self.hits.swap(0, Ordering::Relaxed),
            total: self.total.swap(0, Ordering::Relaxed),
            item_count: self.inner.lock().len() as u64,
            evictions: self.evictions.swap(0, Ordering::Relaxed),
            errors: 0,
        }
    }
}
