//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Reachability probes and the connectivity monitor.
pub mod connectivity;
/// Thumbnail caches.
pub mod image;
/// Durable upload queue.
pub mod queue;
/// Hosted backend client.
pub mod remote;
/// Atomic file helpers.
pub mod storage;

pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use connectivity::{ConnectivityMonitor, HttpReachabilityProbe, ManualProbe};
pub use image::{DiskThumbnailCache, MemoryThumbnailCache, TieredThumbnailCache};
pub use queue::PendingUploadStore;
pub use remote::HttpRemote;
