//! Remote record API port definition.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::entities::{ResourceId, TargetRef};
use crate::domain::errors::RemoteError;

/// Reference to a blob stored in the remote object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef {
    /// Object path inside the bucket.
    pub path: ResourceId,
}

impl BlobRef {
    /// Reference to the object at `path`.
    #[must_use]
    pub fn new(path: impl Into<ResourceId>) -> Self {
        Self { path: path.into() }
    }
}

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Port for delivering uploads to the hosted backend.
///
/// Both operations must be idempotent for a given path / target: a replay
/// overwrites, it never creates a second attachment.
#[async_trait]
pub trait RemoteRecordPort: Send + Sync {
    /// Writes the payload to the object store at `path` (upsert).
    async fn upload_blob(
        &self,
        path: &ResourceId,
        payload: Bytes,
        mime_type: &str,
    ) -> Result<BlobRef, RemoteError>;

    /// Points the target record slot at the uploaded blob.
    async fn attach_upload_to_target(
        &self,
        target: &TargetRef,
        blob: &BlobRef,
    ) -> Result<(), RemoteError>;
}
