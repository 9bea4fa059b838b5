//! In-memory LRU thumbnail cache implementation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::{CacheEntry, CacheKey, ResourceId, SizeVariant};
use crate::domain::ports::ThumbnailCachePort;

/// Default maximum number of thumbnails to keep in memory.
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// In-memory LRU cache for recently displayed thumbnails.
/// Thread-safe and optimized for frequent reads.
pub struct MemoryThumbnailCache {
    cache: RwLock<LruCache<CacheKey, CacheEntry>>,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryThumbnailCache {
    /// Creates a new cache with the specified capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(cap)),
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default capacity.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }

    /// Inserts an entry that was read from a slower tier, keeping its
    /// original store time.
    pub async fn promote(&self, entry: CacheEntry) {
        let mut cache = self.cache.write().await;
        cache.put(entry.key.clone(), entry);
    }

    /// Peeks at an entry without promoting it in the LRU.
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let cache = self.cache.read().await;
        cache.peek(key).cloned()
    }

    /// Drops a single key.
    pub async fn remove(&self, key: &CacheKey) {
        self.cache.write().await.pop(key);
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let size = self.cache.try_read().map(|c| c.len()).unwrap_or(0);
        CacheStats {
            hits,
            misses,
            hit_rate,
            size,
        }
    }
}

impl Default for MemoryThumbnailCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached thumbnails.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} thumbnails, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}

#[async_trait::async_trait]
impl ThumbnailCachePort for MemoryThumbnailCache {
    async fn get(&self, resource_id: &ResourceId, variant: SizeVariant) -> Option<CacheEntry> {
        let key = CacheKey::new(resource_id.clone(), variant);
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(entry.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
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
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            mime_type: mime_type.to_string(),
            stored_at: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let mut cache = self.cache.write().await;
        trace!(key = %key, "Storing thumbnail in memory cache");
        cache.put(key, entry);
    }

    async fn invalidate(&self, resource_id: &ResourceId) {
        let mut cache = self.cache.write().await;
        for variant in SizeVariant::ALL {
            if cache
                .pop(&CacheKey::new(resource_id.clone(), variant))
                .is_some()
            {
                debug!(resource = %resource_id, variant = %variant, "Evicted thumbnail from memory cache");
            }
        }
    }

    async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn total_bytes(&self) -> u64 {
        self.cache
            .read()
            .await
            .iter()
            .map(|(_, entry)| entry.size_bytes())
            .sum()
    }

    async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        debug!("Cleared memory thumbnail cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(id: &str) -> ResourceId {
        ResourceId::new(id)
    }

    #[tokio::test]
    async fn test_cache_put_and_get() {
        let cache = MemoryThumbnailCache::new(10);
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"png"), "image/png")
            .await;

        let entry = cache.get(&res("a"), SizeVariant::Small).await.unwrap();
        assert_eq!(&entry.payload[..], b"png");
        assert_eq!(entry.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache = MemoryThumbnailCache::new(2);
        for id in ["a", "b", "c"] {
            cache
                .set(&res(id), SizeVariant::Small, Bytes::from_static(b"x"), "image/png")
                .await;
        }

        // "a" should be evicted (LRU)
        assert!(cache.get(&res("a"), SizeVariant::Small).await.is_none());
        assert!(cache.get(&res("b"), SizeVariant::Small).await.is_some());
        assert!(cache.get(&res("c"), SizeVariant::Small).await.is_some());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = MemoryThumbnailCache::new(10);
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"x"), "image/png")
            .await;

        // Hit
        let _ = cache.get(&res("a"), SizeVariant::Small).await;
        // Miss
        let _ = cache.get(&res("missing"), SizeVariant::Small).await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_invalidate_drops_every_variant() {
        let cache = MemoryThumbnailCache::new(10);
        for variant in SizeVariant::ALL {
            cache
                .set(&res("a"), variant, Bytes::from_static(b"x"), "image/png")
                .await;
        }

        cache.invalidate(&res("a")).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_peek_does_not_promote() {
        let cache = MemoryThumbnailCache::new(2);
        cache
            .set(&res("a"), SizeVariant::Small, Bytes::from_static(b"x"), "image/png")
            .await;
        cache
            .set(&res("b"), SizeVariant::Small, Bytes::from_static(b"x"), "image/png")
            .await;

        let _ = cache.peek(&CacheKey::new("a", SizeVariant::Small)).await;

        cache
            .set(&res("c"), SizeVariant::Small, Bytes::from_static(b"x"), "image/png")
            .await;

        assert!(cache.peek(&CacheKey::new("a", SizeVariant::Small)).await.is_none());
    }
}
