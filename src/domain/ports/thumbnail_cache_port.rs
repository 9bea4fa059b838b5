//! Port definition for thumbnail caching.

use bytes::Bytes;

use crate::domain::entities::{CacheEntry, ResourceId, SizeVariant};

/// Persistent key→blob store for rendered thumbnails.
///
/// Implementations must be thread-safe and serialize concurrent writes.
/// Every method is infallible from the caller's perspective: caching is an
/// optimization and never a correctness dependency.
#[async_trait::async_trait]
pub trait ThumbnailCachePort: Send + Sync {
    /// Looks up a thumbnail. Never touches the network; a miss is `None`.
    async fn get(&self, resource_id: &ResourceId, variant: SizeVariant) -> Option<CacheEntry>;

    /// Stores a thumbnail, replacing any entry with the same key and evicting
    /// the oldest entries when over quota.
    async fn set(
        &self,
        resource_id: &ResourceId,
        variant: SizeVariant,
        payload: Bytes,
        mime_type: &str,
    );

    /// Removes every size variant of a resource.
    async fn invalidate(&self, resource_id: &ResourceId);

    /// Returns the current number of cached entries.
    async fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total payload bytes currently stored.
    async fn total_bytes(&self) -> u64;

    /// Clears all entries.
    async fn clear(&self);
}
