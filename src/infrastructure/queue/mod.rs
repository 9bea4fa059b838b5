//! Durable upload queue.

pub mod file_store;

pub use file_store::{PendingUploadStore, QueueCounts};
