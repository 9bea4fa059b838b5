//! Thumbnail cache domain types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a remote image resource.
///
/// Usually the object path inside the storage bucket
/// (`stage-photo/project_stages/42/wiring.jpg`), or a full URL for images
/// that live outside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a new `ResourceId` from any string-like input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex digest used to name files on disk.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Pixel-size tier of a rendered thumbnail.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SizeVariant {
    /// List rows and grids.
    Small,
    /// Cards.
    Medium,
    /// Detail views.
    Large,
    /// Original resolution.
    Full,
}

impl SizeVariant {
    /// All variants, smallest first.
    pub const ALL: [Self; 4] = [Self::Small, Self::Medium, Self::Large, Self::Full];

    /// Bounding box edge in pixels, `None` for the original image.
    #[must_use]
    pub const fn max_edge(self) -> Option<u32> {
        match self {
            Self::Small => Some(160),
            Self::Medium => Some(480),
            Self::Large => Some(1024),
            Self::Full => None,
        }
    }

    /// Lowercase name used in paths and config.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for SizeVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Image the thumbnail was rendered from.
    pub resource_id: ResourceId,
    /// Size tier.
    pub variant: SizeVariant,
}

impl CacheKey {
    /// Key for one variant of a resource.
    #[must_use]
    pub fn new(resource_id: impl Into<ResourceId>, variant: SizeVariant) -> Self {
        Self {
            resource_id: resource_id.into(),
            variant,
        }
    }

    /// File stem for this key, unique per (resource, variant).
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.resource_id.digest(), self.variant)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.resource_id, self.variant)
    }
}

/// A cached thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Resource and variant.
    pub key: CacheKey,
    /// Encoded image bytes.
    pub payload: Bytes,
    /// Content type of `payload`.
    pub mime_type: String,
    /// When the entry was written. Oldest entries are evicted first.
    pub stored_at: DateTime<Utc>,
    /// Store order tie-breaker for entries written within the same instant.
    pub sequence: u64,
}

impl CacheEntry {
    /// Payload length counted against the quota.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_digest_is_stable() {
        let id = ResourceId::new("stage-photo/project_stages/42/wiring.jpg");
        assert_eq!(id.digest(), id.clone().digest());
        assert_eq!(id.digest().len(), 32);
    }

    #[test]
    fn test_file_stem_differs_per_variant() {
        let small = CacheKey::new("a.jpg", SizeVariant::Small);
        let full = CacheKey::new("a.jpg", SizeVariant::Full);
        assert_ne!(small.file_stem(), full.file_stem());
        assert!(small.file_stem().ends_with("-small"));
    }

    #[test]
    fn test_variant_edges_grow() {
        assert!(SizeVariant::Small.max_edge() < SizeVariant::Medium.max_edge());
        assert!(SizeVariant::Medium.max_edge() < SizeVariant::Large.max_edge());
        assert_eq!(SizeVariant::Full.max_edge(), None);
    }
}
