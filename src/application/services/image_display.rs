//! Cache-first image resolution for display.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::domain::entities::{ResourceId, SizeVariant, TargetRef, UploadId, UploadStatus};
use crate::domain::errors::RemoteError;
use crate::domain::ports::{FetchedImage, ImageSourcePort, ThumbnailCachePort};
use crate::infrastructure::queue::PendingUploadStore;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DATA_URI_PREFIX: &str = "data:";

/// Where displayed bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Decoded from an inline `data:` URI.
    Inline,
    /// Served from the thumbnail cache.
    Cache,
    /// Sized render from the thumbnail endpoint.
    Thumbnail,
    /// Original image through the authenticated proxy.
    Full,
}

/// Outcome of resolving an image reference. Resolution never fails; the
/// UI shows a placeholder for `Broken`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayImage {
    /// Bytes ready to decode and draw.
    Ready {
        /// Encoded image.
        bytes: Bytes,
        /// Content type of `bytes`.
        mime_type: String,
        /// Which source answered.
        origin: ImageOrigin,
    },
    /// Every source failed.
    Broken {
        /// Last failure, for logs and tooltips.
        reason: String,
    },
}

impl DisplayImage {
    fn ready(bytes: Bytes, mime_type: impl Into<String>, origin: ImageOrigin) -> Self {
        Self::Ready {
            bytes,
            mime_type: mime_type.into(),
            origin,
        }
    }

    fn broken(reason: impl Into<String>) -> Self {
        Self::Broken {
            reason: reason.into(),
        }
    }

    /// Returns true for the placeholder outcome.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        matches!(self, Self::Broken { .. })
    }

    /// Source of a ready image.
    #[must_use]
    pub const fn origin(&self) -> Option<ImageOrigin> {
        match self {
            Self::Ready { origin, .. } => Some(*origin),
            Self::Broken { .. } => None,
        }
    }
}

/// A queued photo shown in place of the remote image until delivery.
#[derive(Debug, Clone)]
pub struct LocalPreview {
    /// Queued upload holding the photo.
    pub id: UploadId,
    /// Delivery state, for a badge on the preview.
    pub status: UploadStatus,
    /// Attempts made so far.
    pub attempts: u32,
    /// Most recent delivery error.
    pub last_error: Option<String>,
    /// Local payload.
    pub bytes: Bytes,
    /// Content type of `bytes`.
    pub mime_type: String,
}

/// Resolves image references for the UI: inline data, then the thumbnail
/// cache, then the network, then a broken-image marker.
pub struct ImageDisplayAdapter {
    cache: Arc<dyn ThumbnailCachePort>,
    images: Arc<dyn ImageSourcePort>,
    store: Arc<PendingUploadStore>,
    fetch_timeout: Duration,
}

impl ImageDisplayAdapter {
    /// Adapter with the default 30 second fetch timeout.
    #[must_use]
    pub fn new(
        cache: Arc<dyn ThumbnailCachePort>,
        images: Arc<dyn ImageSourcePort>,
        store: Arc<PendingUploadStore>,
    ) -> Self {
        Self {
            cache,
            images,
            store,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Sets the timeout applied to each network fetch.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Cached bytes only. Never touches the network.
    pub async fn cached(&self, resource_id: &ResourceId, variant: SizeVariant) -> Option<DisplayImage> {
        let entry = match self.cache.get(resource_id, variant).await {
            Some(entry) => entry,
            None if variant != SizeVariant::Full => {
                self.cache.get(resource_id, SizeVariant::Full).await?
            }
            None => return None,
        };
        trace!(key = %entry.key, "Image served from cache");
        Some(DisplayImage::ready(
            entry.payload,
            entry.mime_type,
            ImageOrigin::Cache,
        ))
    }

    /// Resolves `reference` for display: an inline `data:` URI, the cache
    /// (falling back to the `full` variant), the thumbnail endpoint, then the
    /// full-resolution proxy. Network results are cached. Each fetch is bounded
    /// by the fetch timeout, so this always returns.
    pub async fn resolve(&self, reference: &str, variant: SizeVariant) -> DisplayImage {
        let reference = reference.trim();
        if reference.is_empty() {
            return DisplayImage::broken("no image reference");
        }
        if reference.starts_with(DATA_URI_PREFIX) {
            return decode_data_uri(reference);
        }

        let resource_id = ResourceId::new(reference);
        if let Some(image) = self.cached(&resource_id, variant).await {
            return image;
        }

        if variant != SizeVariant::Full {
            match self
                .fetch(self.images.fetch_thumbnail(&resource_id, variant))
                .await
            {
                Ok(image) => {
                    self.cache
                        .set(&resource_id, variant, image.bytes.clone(), &image.mime_type)
                        .await;
                    return DisplayImage::ready(image.bytes, image.mime_type, ImageOrigin::Thumbnail);
                }
                Err(e) => {
                    debug!(resource = %resource_id, variant = %variant, error = %e, "Thumbnail unavailable, trying original");
                }
            }
        }

        match self.fetch(self.images.fetch_full(&resource_id)).await {
            Ok(image) => {
                self.cache
                    .set(
                        &resource_id,
                        SizeVariant::Full,
                        image.bytes.clone(),
                        &image.mime_type,
                    )
                    .await;
                DisplayImage::ready(image.bytes, image.mime_type, ImageOrigin::Full)
            }
            Err(e) => {
                debug!(resource = %resource_id, error = %e, "Image unavailable");
                DisplayImage::broken(e.to_string())
            }
        }
    }

    /// The newest queued or failed upload for `target`, with its bytes.
    pub async fn local_preview(&self, target: &TargetRef) -> Option<LocalPreview> {
        let record = self.store.find_by_target(target).await?;
        let bytes = match self.store.payload(record.id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(id = %record.id, error = %e, "Queued payload unreadable");
                return None;
            }
        };
        Some(LocalPreview {
            id: record.id,
            status: record.status,
            attempts: record.attempts,
            last_error: record.last_error,
            bytes,
            mime_type: record.mime_type,
        })
    }

    async fn fetch<F>(&self, request: F) -> Result<FetchedImage, RemoteError>
    where
        F: Future<Output = Result<FetchedImage, RemoteError>>,
    {
        let image = tokio::time::timeout(self.fetch_timeout, request)
            .await
            .map_err(|_| RemoteError::transient("image request timed out"))??;
        if image.bytes.is_empty() {
            return Err(RemoteError::transient("empty image body"));
        }
        Ok(image)
    }
}

fn decode_data_uri(uri: &str) -> DisplayImage {
    let Some((header, data)) = uri[DATA_URI_PREFIX.len()..].split_once(',') else {
        return DisplayImage::broken("malformed data URI");
    };
    let Some(mime_type) = header.strip_suffix(";base64") else {
        return DisplayImage::broken("unsupported data URI encoding");
    };
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };

    match STANDARD.decode(data.trim()) {
        Ok(bytes) if !bytes.is_empty() => {
            DisplayImage::ready(Bytes::from(bytes), mime_type, ImageOrigin::Inline)
        }
        Ok(_) => DisplayImage::broken("empty data URI"),
        Err(e) => DisplayImage::broken(format!("invalid base64: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::UploadKind;
    use crate::domain::ports::mocks::MockImageSourcePort;
    use crate::infrastructure::image::MemoryThumbnailCache;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        cache: Arc<MemoryThumbnailCache>,
        store: Arc<PendingUploadStore>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(PendingUploadStore::open(dir.path().join("queue")).await.unwrap());
        Fixture {
            _dir: dir,
            cache: Arc::new(MemoryThumbnailCache::new(16)),
            store,
        }
    }

    fn adapter(f: &Fixture, images: MockImageSourcePort) -> ImageDisplayAdapter {
        ImageDisplayAdapter::new(f.cache.clone(), Arc::new(images), f.store.clone())
    }

    fn fetched(bytes: &'static [u8]) -> FetchedImage {
        FetchedImage {
            bytes: Bytes::from_static(bytes),
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_data_uri_is_decoded_inline() {
        let f = fixture().await;
        let adapter = adapter(&f, MockImageSourcePort::new());

        let image = adapter
            .resolve("data:image/png;base64,aGVsbG8=", SizeVariant::Small)
            .await;

        assert_eq!(
            image,
            DisplayImage::ready(Bytes::from_static(b"hello"), "image/png", ImageOrigin::Inline)
        );
        assert!(f.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_bad_data_uri_is_broken() {
        let f = fixture().await;
        let adapter = adapter(&f, MockImageSourcePort::new());

        assert!(adapter.resolve("data:image/png;base64,%%%", SizeVariant::Small).await.is_broken());
        assert!(adapter.resolve("data:text/plain,hello", SizeVariant::Small).await.is_broken());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let f = fixture().await;
        f.cache
            .set(&ResourceId::new("a.jpg"), SizeVariant::Small, Bytes::from_static(b"thumb"), "image/jpeg")
            .await;
        let adapter = adapter(&f, MockImageSourcePort::new());

        let image = adapter.resolve("a.jpg", SizeVariant::Small).await;
        assert_eq!(image.origin(), Some(ImageOrigin::Cache));
    }

    #[tokio::test]
    async fn test_cached_original_serves_any_variant() {
        let f = fixture().await;
        f.cache
            .set(&ResourceId::new("a.jpg"), SizeVariant::Full, Bytes::from_static(b"orig"), "image/jpeg")
            .await;
        let adapter = adapter(&f, MockImageSourcePort::new());

        let image = adapter.resolve("a.jpg", SizeVariant::Medium).await;
        assert_eq!(
            image,
            DisplayImage::ready(Bytes::from_static(b"orig"), "image/jpeg", ImageOrigin::Cache)
        );
    }

    #[tokio::test]
    async fn test_thumbnail_fetch_populates_cache() {
        let f = fixture().await;
        let mut images = MockImageSourcePort::new();
        images
            .expect_fetch_thumbnail()
            .times(1)
            .returning(|_, _| Ok(fetched(b"thumb")));
        let adapter = adapter(&f, images);

        let first = adapter.resolve("a.jpg", SizeVariant::Small).await;
        let second = adapter.resolve("a.jpg", SizeVariant::Small).await;

        assert_eq!(first.origin(), Some(ImageOrigin::Thumbnail));
        assert_eq!(second.origin(), Some(ImageOrigin::Cache));
    }

    #[tokio::test]
    async fn test_falls_back_to_original() {
        let f = fixture().await;
        let mut images = MockImageSourcePort::new();
        images
            .expect_fetch_thumbnail()
            .times(1)
            .returning(|_, _| Err(RemoteError::permanent(400, "transformations disabled")));
        images
            .expect_fetch_full()
            .times(1)
            .returning(|_| Ok(fetched(b"orig")));
        let adapter = adapter(&f, images);

        let image = adapter.resolve("a.jpg", SizeVariant::Large).await;

        assert_eq!(image.origin(), Some(ImageOrigin::Full));
        assert!(f.cache.get(&ResourceId::new("a.jpg"), SizeVariant::Full).await.is_some());
    }

    #[tokio::test]
    async fn test_everything_failing_is_broken() {
        let f = fixture().await;
        let mut images = MockImageSourcePort::new();
        images
            .expect_fetch_thumbnail()
            .returning(|_, _| Err(RemoteError::transient("offline")));
        images
            .expect_fetch_full()
            .returning(|_| Err(RemoteError::transient("offline")));
        let adapter = adapter(&f, images);

        let image = adapter.resolve("a.jpg", SizeVariant::Small).await;
        assert!(image.is_broken());
        assert!(adapter.resolve("   ", SizeVariant::Small).await.is_broken());
    }

    #[tokio::test]
    async fn test_local_preview_shows_queued_photo() {
        let f = fixture().await;
        let target = TargetRef::new("project_stages", "42", "photo");
        let id = f
            .store
            .enqueue(UploadKind::StagePhoto, target.clone(), Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        let adapter = adapter(&f, MockImageSourcePort::new());

        let preview = adapter.local_preview(&target).await.unwrap();
        assert_eq!(preview.id, id);
        assert_eq!(preview.status, UploadStatus::Queued);
        assert_eq!(&preview.bytes[..], b"jpeg");

        let other = TargetRef::new("project_stages", "43", "photo");
        assert!(adapter.local_preview(&other).await.is_none());
    }
}
