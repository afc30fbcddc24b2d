//! On-disk cache backend.
//!
//! Each entry is two files named by the blake3 hash of the cache key:
//! `<hash>` holds the response body, `<hash>.meta` a JSON sidecar with
//! the validator, expiry, status, and headers. A per-key async RwLock
//! keeps concurrent readers out of half-written entries without
//! serializing unrelated keys.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use super::entry::{now_ms, CacheEntry};
use super::{CacheLayer, LayerStats};

#[derive(Serialize, Deserialize)]
struct DiskEntryMeta {
    etag: Option<String>,
    expires_at_ms: u64,
    status: u16,
    headers: Vec<(String, String)>,
}

pub struct DiskCache {
    root: PathBuf,
    locks: DashMap<String, Arc<RwLock<()>>>,
    item_count: AtomicU64,
    hits: AtomicU64,
    total: AtomicU64,
    errors: AtomicU64,
}

impl DiskCache {
    /// Open (and create if needed) a cache rooted at `root`. Entries
    /// left behind by a previous process are counted and reused.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<DiskCache> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let mut existing = 0u64;
        let mut dir = tokio::fs::read_dir(&root).await?;
        while let Some(item) = dir.next_entry().await? {
            if item.path().extension().is_some_and(|ext| ext == "meta") {
                existing += 1;
            }
        }

        Ok(DiskCache {
            root,
            locks: DashMap::new(),
            item_count: AtomicU64::new(existing),
            hits: AtomicU64::new(0),
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, key: &str) -> Arc<RwLock<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.root.join(blake3::hash(key.as_bytes()).to_hex().as_str())
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        let mut name = blake3::hash(key.as_bytes()).to_hex().to_string();
        name.push_str(".meta");
        self.root.join(name)
    }

    async fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let guard = self.lock_for(key);
        let _read = guard.read().await;

        let meta_bytes = match tokio::fs::read(self.meta_path(key)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "disk cache meta read failed");
                return None;
            }
        };
        let meta: DiskEntryMeta = match serde_json::from_slice(&meta_bytes) {
            Ok(meta) => meta,
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "disk cache meta corrupt");
                return None;
            }
        };
        let body = match tokio::fs::read(self.body_path(key)).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "disk cache body read failed");
                return None;
            }
        };

        Some(CacheEntry {
            etag: meta.etag,
            expires_at_ms: meta.expires_at_ms,
            status: meta.status,
            headers: meta.headers,
            body,
        })
    }

    async fn remove_files(&self, key: &str) -> bool {
        let meta_existed = match tokio::fs::remove_file(self.meta_path(key)).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "disk cache meta remove failed");
                false
            }
        };
        if let Err(err) = tokio::fs::remove_file(self.body_path(key)).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "disk cache body remove failed");
            }
        }
        meta_existed
    }
}

#[async_trait]
impl CacheLayer<CacheEntry> for DiskCache {
    /// A hit requires both files to read back cleanly; anything less is
    /// a miss. Entries past expiry with no validator are dropped here,
    /// since revalidation can never rescue them.
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.total.fetch_add(1, Ordering::Relaxed);
        let entry = self.read_entry(key).await?;

        if !entry.is_fresh() && entry.etag.is_none() {
            self.remove(key).await;
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry)
    }

    /// Mirrors the liveness rule in `get`: an expired entry with no
    /// validator is already dead and must not be reported present.
    async fn has(&self, key: &str) -> bool {
        let guard = self.lock_for(key);
        let _read = guard.read().await;

        let meta_bytes = match tokio::fs::read(self.meta_path(key)).await {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        match serde_json::from_slice::<DiskEntryMeta>(&meta_bytes) {
            Ok(meta) => meta.etag.is_some() || now_ms() < meta.expires_at_ms,
            Err(_) => false,
        }
    }

    async fn set(&self, key: &str, value: CacheEntry, _ttl: Option<Duration>) -> bool {
        let guard = self.lock_for(key);
        let _write = guard.write().await;

        let meta = DiskEntryMeta {
            etag: value.etag.clone(),
            expires_at_ms: value.expires_at_ms,
            status: value.status,
            headers: value.headers.clone(),
        };
        let meta_bytes = match serde_json::to_vec(&meta) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "disk cache meta encode failed");
                return false;
            }
        };

        let replacing = tokio::fs::try_exists(self.meta_path(key)).await.unwrap_or(false);

        if let Err(err) = tokio::fs::write(self.body_path(key), &value.body).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "disk cache body write failed");
            return false;
        }
        if let Err(err) = tokio::fs::write(self.meta_path(key), &meta_bytes).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "disk cache meta write failed");
            // Drop the body so a later read cannot pair it with an old
            // sidecar.
            let _ = tokio::fs::remove_file(self.body_path(key)).await;
            return false;
        }

        if !replacing {
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    async fn remove(&self, key: &str) {
        let guard = self.lock_for(key);
        let _write = guard.write().await;
        if self.remove_files(key).await {
            self.item_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> LayerStats {
        LayerStats {
            hits: self.hits.swap(0, Ordering::Relaxed),
            total: self.total.swap(0, Ordering::Relaxed),
            item_count: self.item_count.load(Ordering::Relaxed),
            evictions: 0,
            errors: self.errors.swap(0, Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(etag: Option<&str>, expires_at_ms: u64, body: &'static [u8]) -> CacheEntry {
        CacheEntry {
            etag: etag.map(str::to_owned),
            expires_at_ms,
            status: 200,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: Bytes::from_static(body),
        }
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();

        let stored = entry(Some("\"v1\""), now_ms() + 60_000, b"payload");
        assert!(cache.set("https://api.example.com/a", stored.clone(), None).await);

        let read = cache.get("https://api.example.com/a").await.unwrap();
        assert_eq!(read, stored);
        assert!(cache.has("https://api.example.com/a").await);
    }

    #[tokio::test]
    async fn test_missing_key_is_a_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();
        assert!(cache.get("nope").await.is_none());
        assert!(!cache.has("nope").await);
    }

    #[tokio::test]
    async fn test_corrupt_meta_degrades_to_miss() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();

        cache.set("k", entry(Some("\"v1\""), now_ms() + 60_000, b"payload"), None).await;
        tokio::fs::write(cache.meta_path("k"), b"not json").await.unwrap();

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_expired_without_validator_is_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();

        cache.set("k", entry(None, now_ms().saturating_sub(1_000), b"old"), None).await;
        assert!(cache.get("k").await.is_none());
        assert!(!cache.has("k").await, "dead entry deleted on read");
        assert_eq!(cache.stats().item_count, 0);
    }

    #[tokio::test]
    async fn test_has_reports_dead_entry_absent_before_any_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();

        cache.set("dead", entry(None, now_ms().saturating_sub(1_000), b"old"), None).await;
        assert!(!cache.has("dead").await, "expired entry without validator");

        cache.set("stale", entry(Some("\"v1\""), now_ms().saturating_sub(1_000), b"s"), None).await;
        assert!(cache.has("stale").await, "revalidatable entry still counts");
    }

    #[tokio::test]
    async fn test_expired_with_validator_survives_for_revalidation() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();

        let stale = entry(Some("\"v1\""), now_ms().saturating_sub(1_000), b"stale");
        cache.set("k", stale.clone(), None).await;

        let read = cache.get("k").await.unwrap();
        assert_eq!(read.etag.as_deref(), Some("\"v1\""));
        assert!(!read.is_fresh());
    }

    #[tokio::test]
    async fn test_replacement_does_not_double_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();

        cache.set("k", entry(Some("\"v1\""), now_ms() + 60_000, b"one"), None).await;
        cache.set("k", entry(Some("\"v2\""), now_ms() + 60_000, b"two"), None).await;
        assert_eq!(cache.stats().item_count, 1);

        cache.remove("k").await;
        assert_eq!(cache.stats().item_count, 0);
    }

    #[tokio::test]
    async fn test_reopen_counts_existing_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let cache = DiskCache::open(dir.path()).await.unwrap();
            cache.set("a", entry(Some("\"v1\""), now_ms() + 60_000, b"a"), None).await;
            cache.set("b", entry(Some("\"v1\""), now_ms() + 60_000, b"b"), None).await;
        }
        let reopened = DiskCache::open(dir.path()).await.unwrap();
        assert_eq!(reopened.stats().item_count, 2);
        assert!(reopened.get("a").await.is_some());
    }
}
