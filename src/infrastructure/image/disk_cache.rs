//! Disk-based thumbnail cache for persistence across sessions.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheEntry, CacheKey, ResourceId, SizeVariant};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::ThumbnailCachePort;
use crate::infrastructure::storage::{remove_if_exists, write_atomic};

/// Maximum disk cache size in bytes (50 MB default).
pub const DEFAULT_QUOTA_BYTES: u64 = 50 * 1024 * 1024;

const BLOB_EXTENSION: &str = "img";
const META_EXTENSION: &str = "json";

/// Sidecar written next to every blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: CacheKey,
    mime_type: String,
    stored_at: DateTime<Utc>,
    sequence: u64,
    size_bytes: u64,
}

#[derive(Default)]
struct Index {
    entries: HashMap<CacheKey, EntryMeta>,
    total_bytes: u64,
    next_sequence: u64,
}

impl Index {
    fn insert(&mut self, meta: EntryMeta) {
        self.total_bytes += meta.size_bytes;
        self.next_sequence = self.next_sequence.max(meta.sequence + 1);
        if let Some(old) = self.entries.insert(meta.key.clone(), meta) {
            self.total_bytes -= old.size_bytes;
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<EntryMeta> {
        let meta = self.entries.remove(key)?;
        self.total_bytes -= meta.size_bytes;
        Some(meta)
    }

    /// Keys in eviction order, oldest store first.
    fn oldest_first(&self) -> Vec<CacheKey> {
        let mut metas: Vec<&EntryMeta> = self.entries.values().collect();
        metas.sort_by_key(|m| (m.stored_at, m.sequence));
        metas.into_iter().map(|m| m.key.clone()).collect()
    }
}

/// Disk-based thumbnail cache with a byte quota.
///
/// Each entry is a blob file plus a JSON sidecar holding key, MIME type and
/// store time. Both are replaced by atomic rename. The in-memory index is
/// guarded by one mutex, which also serializes writers.
pub struct DiskThumbnailCache {
    cache_dir: PathBuf,
    quota_bytes: u64,
    index: Mutex<Index>,
}

impl DiskThumbnailCache {
    /// Opens (or creates) a cache in the specified directory and rebuilds
    /// the index from the sidecars found there.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created or read.
    pub async fn new(cache_dir: PathBuf, quota_bytes: u64) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;

        let mut index = Index::default();
        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != META_EXTENSION) {
                continue;
            }

            let blob_path = path.with_extension(BLOB_EXTENSION);
            let meta = match fs::read(&path).await {
                Ok(raw) => serde_json::from_slice::<EntryMeta>(&raw).ok(),
                Err(_) => None,
            };
            let blob_len = fs::metadata(&blob_path).await.map(|m| m.len()).ok();

            match (meta, blob_len) {
                (Some(meta), Some(len)) if len == meta.size_bytes => index.insert(meta),
                _ => {
                    warn!(path = %path.display(), "Discarding torn cache entry");
                    let _ = remove_if_exists(&path).await;
                    let _ = remove_if_exists(&blob_path).await;
                }
            }
        }

        debug!(
            entries = index.entries.len(),
            total_bytes = index.total_bytes,
            "Opened disk thumbnail cache"
        );

        let cache = Self {
            cache_dir,
            quota_bytes,
            index: Mutex::new(index),
        };

        {
            let mut index = cache.index.lock().await;
            cache.evict_over_quota(&mut index, None).await;
        }

        Ok(cache)
    }

    /// Returns the configured quota.
    #[must_use]
    pub const fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{BLOB_EXTENSION}", key.file_stem()))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{META_EXTENSION}", key.file_stem()))
    }

    /// Stores an entry, reporting why it was not cached.
    ///
    /// # Errors
    /// Returns error if the payload exceeds the quota or a file cannot be
    /// written.
    pub async fn try_set(
        &self,
        key: CacheKey,
        payload: Bytes,
        mime_type: &str,
    ) -> CacheResult<()> {
        let size = payload.len() as u64;
        if size > self.quota_bytes {
            return Err(CacheError::TooLarge {
                size,
                quota: self.quota_bytes,
            });
        }

        let mut index = self.index.lock().await;
        let meta = EntryMeta {
            key: key.clone(),
            mime_type: mime_type.to_string(),
            stored_at: Utc::now(),
            sequence: index.next_sequence,
            size_bytes: size,
        };
        let meta_json =
            serde_json::to_vec(&meta).map_err(|e| CacheError::Metadata(e.to_string()))?;

        let written = async {
            write_atomic(self.blob_path(&key), payload.to_vec()).await?;
            write_atomic(self.meta_path(&key), meta_json).await
        }
        .await;

        if let Err(e) = written {
            // The blob may already be replaced; drop the key entirely.
            index.remove(&key);
            let _ = remove_if_exists(&self.meta_path(&key)).await;
            let _ = remove_if_exists(&self.blob_path(&key)).await;
            return Err(CacheError::IoError(format!("Failed to write cache entry: {e}")));
        }

        index.insert(meta);
        debug!(key = %key, size = size, "Stored thumbnail in disk cache");

        self.evict_over_quota(&mut index, Some(&key)).await;
        Ok(())
    }

    async fn remove_key(&self, index: &mut Index, key: &CacheKey) -> bool {
        if index.remove(key).is_none() {
            return false;
        }
        if let Err(e) = remove_if_exists(&self.meta_path(key)).await {
            warn!(key = %key, error = %e, "Failed to remove cache sidecar");
        }
        if let Err(e) = remove_if_exists(&self.blob_path(key)).await {
            warn!(key = %key, error = %e, "Failed to remove cache blob");
        }
        true
    }

    /// Evicts oldest entries until the total is within quota. `keep` is the
    /// entry that was just written and is never evicted by its own write.
    async fn evict_over_quota(&self, index: &mut Index, keep: Option<&CacheKey>) {
        if index.total_bytes <= self.quota_bytes {
            return;
        }

        debug!(
            total_bytes = index.total_bytes,
            quota_bytes = self.quota_bytes,
            "Disk cache over quota, evicting"
        );

        let mut evicted = 0usize;
        for key in index.oldest_first() {
            if index.total_bytes <= self.quota_bytes {
                break;
            }
            if keep == Some(&key) {
                continue;
            }
            if self.remove_key(index, &key).await {
                evicted += 1;
            }
        }

        debug!(
            evicted = evicted,
            total_bytes = index.total_bytes,
            "Disk cache eviction complete"
        );
    }

    /// Checks if an entry is cached.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.index.lock().await.entries.contains_key(key)
    }
}

#[async_trait::async_trait]
impl ThumbnailCachePort for DiskThumbnailCache {
    async fn get(&self, resource_id: &ResourceId, variant: SizeVariant) -> Option<CacheEntry> {
        let key = CacheKey::new(resource_id.clone(), variant);
        let mut index = self.index.lock().await;
        let meta = index.entries.get(&key)?.clone();

        match fs::read(self.blob_path(&key)).await {
            Ok(bytes) if bytes.len() as u64 == meta.size_bytes => {
                trace!(key = %key, "Disk cache hit");
                Some(CacheEntry {
                    key,
                    payload: Bytes::from(bytes),
                    mime_type: meta.mime_type,
                    stored_at: meta.stored_at,
                    sequence: meta.sequence,
                })
            }
            Ok(_) | Err(_) => {
                warn!(key = %key, "Cached blob missing or truncated, dropping entry");
                self.remove_key(&mut index, &key).await;
                None
            }
        }
    }

    async fn set(
        &self,
        resource_id: &ResourceId,
        variant: SizeVariant,
        payload: Bytes,
        mime_type: &str,
    ) {
        let key = CacheKey::new(resource_id.clone(), variant);
        if let Err(e) = self.try_set(key.clone(), payload, mime_type).await {
            warn!(key = %key, error = %e, "Skipping thumbnail cache write");
        }
    }

    async fn invalidate(&self, resource_id: &ResourceId) {
        let mut index = self.index.lock().await;
        for variant in SizeVariant::ALL {
            let key = CacheKey::new(resource_id.clone(), variant);
            if self.remove_key(&mut index, &key).await {
                debug!(key = %key, "Invalidated cached thumbnail");
            }
        }
    }

    async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    async fn total_bytes(&self) -> u64 {
        self.index.lock().await.total_bytes
    }

    async fn clear(&self) {
        let mut index = self.index.lock().await;
        let keys: Vec<CacheKey> = index.entries.keys().cloned().collect();
        for key in keys {
            self.remove_key(&mut index, &key).await;
        }
        debug!("Cleared disk thumbnail cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_cache(quota: u64) -> (DiskThumbnailCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskThumbnailCache::new(temp_dir.path().to_path_buf(), quota)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    fn res(id: &str) -> ResourceId {
        ResourceId::new(id)
    }

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        let data = Bytes::from_static(b"\xff\xd8jpeg bytes");

        cache
            .set(&res("a.jpg"), SizeVariant::Small, data.clone(), "image/jpeg")
            .await;
        let entry = cache.get(&res("a.jpg"), SizeVariant::Small).await.unwrap();

        assert_eq!(entry.payload, data);
        assert_eq!(entry.mime_type, "image/jpeg");
        assert_eq!(entry.size_bytes(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache(1024).await;
        assert!(cache.get(&res("missing"), SizeVariant::Small).await.is_none());
    }

    #[tokio::test]
    async fn test_variants_are_independent_keys() {
        let (cache, _temp) = create_test_cache(1024).await;
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"s"), "image/png")
            .await;

        assert!(cache.get(&res("a"), SizeVariant::Medium).await.is_none());
        assert!(cache.get(&res("a"), SizeVariant::Small).await.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let (cache, _temp) = create_test_cache(1024).await;
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"hello"), "image/png")
            .await;
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"hey"), "image/webp")
            .await;

        let entry = cache.get(&res("a"), SizeVariant::Small).await.unwrap();
        assert_eq!(&entry.payload[..], b"hey");
        assert_eq!(entry.mime_type, "image/webp");
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.total_bytes().await, 3);
    }

    #[tokio::test]
    async fn test_eviction_keeps_within_quota_oldest_first() {
        let (cache, _temp) = create_test_cache(10).await;

        cache
            .set(&res("first"), SizeVariant::Small, Bytes::from_static(b"1234"), "image/png")
            .await;
        cache
            .set(&res("second"), SizeVariant::Small, Bytes::from_static(b"1234"), "image/png")
            .await;
        cache
            .set(&res("third"), SizeVariant::Small, Bytes::from_static(b"1234"), "image/png")
            .await;

        assert!(cache.total_bytes().await <= 10);
        assert!(cache.get(&res("first"), SizeVariant::Small).await.is_none());
        assert!(cache.get(&res("second"), SizeVariant::Small).await.is_some());
        assert!(cache.get(&res("third"), SizeVariant::Small).await.is_some());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_not_cached() {
        let (cache, _temp) = create_test_cache(4).await;
        cache
            .set(&res("keep"), SizeVariant::Small, Bytes::from_static(b"ok"), "image/png")
            .await;

        let result = cache
            .try_set(
                CacheKey::new("huge", SizeVariant::Full),
                Bytes::from_static(b"too large"),
                "image/png",
            )
            .await;

        assert!(matches!(result, Err(CacheError::TooLarge { .. })));
        assert!(cache.get(&res("keep"), SizeVariant::Small).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_removes_all_variants() {
        let (cache, _temp) = create_test_cache(1024).await;
        for variant in [SizeVariant::Small, SizeVariant::Large] {
            cache
                .set(&res("a"), variant, Bytes::from_static(b"x"), "image/png")
                .await;
        }
        cache
            .set(&res("b"), SizeVariant::Small, Bytes::from_static(b"y"), "image/png")
            .await;

        cache.invalidate(&res("a")).await;

        assert!(cache.get(&res("a"), SizeVariant::Small).await.is_none());
        assert!(cache.get(&res("a"), SizeVariant::Large).await.is_none());
        assert!(cache.get(&res("b"), SizeVariant::Small).await.is_some());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = DiskThumbnailCache::new(temp_dir.path().to_path_buf(), 1024)
                .await
                .unwrap();
            cache
                .set(&res("a"), SizeVariant::Medium, Bytes::from_static(b"abc"), "image/png")
                .await;
        }

        let reopened = DiskThumbnailCache::new(temp_dir.path().to_path_buf(), 1024)
            .await
            .unwrap();
        let entry = reopened.get(&res("a"), SizeVariant::Medium).await.unwrap();
        assert_eq!(&entry.payload[..], b"abc");
        assert_eq!(reopened.total_bytes().await, 3);
    }

    #[tokio::test]
    async fn test_torn_entry_is_discarded_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let key = CacheKey::new("a", SizeVariant::Small);
        {
            let cache = DiskThumbnailCache::new(temp_dir.path().to_path_buf(), 1024)
                .await
                .unwrap();
            cache
                .set(&key.resource_id, key.variant, Bytes::from_static(b"abc"), "image/png")
                .await;
            std::fs::write(cache.blob_path(&key), b"abcdef").unwrap();
        }

        let reopened = DiskThumbnailCache::new(temp_dir.path().to_path_buf(), 1024)
            .await
            .unwrap();
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _temp) = create_test_cache(1024).await;
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"1"), "image/png")
            .await;
        cache
            .set(&res("b"), SizeVariant::Small, Bytes::from_static(b"2"), "image/png")
            .await;

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.total_bytes().await, 0);
    }
}
