//! Application layer: the sync orchestrator, image display, and the engine
//! facade that wires them to storage and the network.

/// Engine facade.
pub mod engine;
/// Application services.
pub mod services;

pub use engine::{EngineConfig, EngineError, SyncEngine};
pub use services::{
    DisplayImage, DrainReport, DrainStop, ImageOrigin, LocalPreview, PhotoCompressor, RetryPolicy,
    SyncEvent, SyncOrchestrator,
};
