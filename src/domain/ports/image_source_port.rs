//! Port for fetching rendered images from the backend.

use bytes::Bytes;

use crate::domain::entities::{ResourceId, SizeVariant};
use crate::domain::errors::RemoteError;

/// Image bytes as returned by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Encoded image.
    pub bytes: Bytes,
    /// Content type reported by the server.
    pub mime_type: String,
}

/// Stateless GET-by-reference access to the thumbnail and proxy endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageSourcePort: Send + Sync {
    /// Requests a generated thumbnail for the given size tier.
    async fn fetch_thumbnail(
        &self,
        resource_id: &ResourceId,
        variant: SizeVariant,
    ) -> Result<FetchedImage, RemoteError>;

    /// Requests the original image through the authenticated proxy.
    async fn fetch_full(&self, resource_id: &ResourceId) -> Result<FetchedImage, RemoteError>;
}
