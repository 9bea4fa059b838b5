//! Thumbnail caching infrastructure.
//!
//! This module provides:
//! - Disk caching with a byte quota for persistence
//! - Memory caching with LRU eviction
//! - A tiered cache combining both

pub mod disk_cache;
pub mod memory_cache;
pub mod tiered_cache;

pub use disk_cache::{DEFAULT_QUOTA_BYTES, DiskThumbnailCache};
pub use memory_cache::{CacheStats, DEFAULT_CACHE_SIZE, MemoryThumbnailCache};
pub use tiered_cache::TieredThumbnailCache;
