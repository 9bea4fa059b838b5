//! Memory -> disk thumbnail cache.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::domain::entities::{CacheEntry, CacheKey, ResourceId, SizeVariant};
use crate::domain::ports::ThumbnailCachePort;

use super::disk_cache::DiskThumbnailCache;
use super::memory_cache::{CacheStats, MemoryThumbnailCache};

/// Read-through, write-through pair of caches. The disk tier owns the
/// quota; the memory tier only keeps recently used entries hot.
pub struct TieredThumbnailCache {
    memory: MemoryThumbnailCache,
    disk: Arc<DiskThumbnailCache>,
}

impl TieredThumbnailCache {
    /// Pairs a memory tier with the disk tier that owns the quota.
    #[must_use]
    pub fn new(memory: MemoryThumbnailCache, disk: Arc<DiskThumbnailCache>) -> Self {
        Self { memory, disk }
    }

    /// Returns memory tier statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }
}

#[async_trait::async_trait]
impl ThumbnailCachePort for TieredThumbnailCache {
    async fn get(&self, resource_id: &ResourceId, variant: SizeVariant) -> Option<CacheEntry> {
        if let Some(entry) = self.memory.get(resource_id, variant).await {
            return Some(entry);
        }

        let entry = self.disk.get(resource_id, variant).await?;
        trace!(key = %entry.key, "Promoting disk entry to memory");
        self.memory.promote(entry.clone()).await;
        Some(entry)
    }

    async fn set(
        &self,
        resource_id: &ResourceId,
        variant: SizeVariant,
        payload: Bytes,
        mime_type: &str,
    ) {
        let key = CacheKey::new(resource_id.clone(), variant);
        match self.disk.try_set(key.clone(), payload.clone(), mime_type).await {
            Ok(()) => self.memory.set(resource_id, variant, payload, mime_type).await,
            Err(e) => {
                debug!(key = %key, error = %e, "Disk tier refused entry, dropping it from memory");
                self.memory.remove(&key).await;
            }
        }
    }

    async fn invalidate(&self, resource_id: &ResourceId) {
        self.memory.invalidate(resource_id).await;
        self.disk.invalidate(resource_id).await;
    }

    async fn len(&self) -> usize {
        self.disk.len().await
    }

    async fn total_bytes(&self) -> u64 {
        self.disk.total_bytes().await
    }

    async fn clear(&self) {
        self.memory.clear().await;
        self.disk.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_disk_hit_is_promoted() {
        let temp = TempDir::new().unwrap();
        let disk = Arc::new(
            DiskThumbnailCache::new(temp.path().to_path_buf(), 1024)
                .await
                .unwrap(),
        );
        let id = ResourceId::new("a");
        disk.set(&id, SizeVariant::Small, Bytes::from_static(b"x"), "image/png")
            .await;

        let tiered = TieredThumbnailCache::new(MemoryThumbnailCache::new(4), disk);
        assert!(tiered.get(&id, SizeVariant::Small).await.is_some());
        assert_eq!(tiered.memory_stats().size, 1);
    }

    #[tokio::test]
    async fn test_invalidate_clears_both_tiers() {
        let temp = TempDir::new().unwrap();
        let disk = Arc::new(
            DiskThumbnailCache::new(temp.path().to_path_buf(), 1024)
                .await
                .unwrap(),
        );
        let tiered = TieredThumbnailCache::new(MemoryThumbnailCache::new(4), disk.clone());
        let id = ResourceId::new("a");
        tiered
            .set(&id, SizeVariant::Full, Bytes::from_static(b"x"), "image/jpeg")
            .await;

        tiered.invalidate(&id).await;

        assert!(tiered.get(&id, SizeVariant::Full).await.is_none());
        assert!(disk.is_empty().await);
    }

    #[tokio::test]
    async fn test_entry_refused_by_disk_stays_out_of_memory() {
        let temp = TempDir::new().unwrap();
        let disk = Arc::new(
            DiskThumbnailCache::new(temp.path().to_path_buf(), 4)
                .await
                .unwrap(),
        );
        let tiered = TieredThumbnailCache::new(MemoryThumbnailCache::new(4), disk.clone());
        let id = ResourceId::new("a");

        tiered
            .set(&id, SizeVariant::Small, Bytes::from_static(b"far too large"), "image/png")
            .await;

        assert!(tiered.get(&id, SizeVariant::Small).await.is_none());
        assert_eq!(tiered.memory_stats().size, 0);
        assert!(disk.is_empty().await);
    }
}
