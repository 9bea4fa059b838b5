//! Domain entity definitions.

mod api_key;
mod cache_entry;
mod pending_upload;
mod sync_state;

pub use api_key::ApiKey;
pub use cache_entry::{CacheEntry, CacheKey, ResourceId, SizeVariant};
pub use pending_upload::{
    PendingUpload, TargetRef, UploadId, UploadKind, UploadStatus, extension_for_mime,
};
pub use sync_state::{DrainProgress, SyncPhase, SyncState, SyncStatus};
