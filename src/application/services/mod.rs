pub mod image_display;
pub mod photo_compressor;
pub mod retry_policy;
pub mod sync_orchestrator;


pub use image_display::{DisplayImage, ImageDisplayAdapter, ImageOrigin, LocalPreview};
pub use photo_compressor::{CompressError, CompressedPhoto, PhotoCompressor};
pub use retry_policy::RetryPolicy;
pub use sync_orchestrator::{DrainReport, DrainStop, SyncEvent, SyncOrchestrator};
