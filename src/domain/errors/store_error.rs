//! Local storage error types.

use std::io;

use thiserror::Error;

use crate::domain::entities::UploadId;

/// Errors from the pending-upload store. These are fatal to durability and
/// must reach the user at enqueue time.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id.
    #[error("upload {0} not found")]
    NotFound(UploadId),

    /// The record is not in the status the operation requires.
    #[error("upload {id} is {status}, expected {expected}")]
    InvalidState {
        /// Record that was addressed.
        id: UploadId,
        /// Status it actually has.
        status: String,
        /// Status the operation needs.
        expected: &'static str,
    },

    /// A record or payload could not be written durably.
    #[error("failed to persist upload: {message}")]
    Persist {
        /// What could not be written.
        message: String,
    },

    /// A record file could not be parsed.
    #[error("corrupt upload record {path}: {message}")]
    Corrupt {
        /// Offending file.
        path: String,
        /// Parser error.
        message: String,
    },

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Shorthand for [`StoreError::Persist`].
    #[must_use]
    pub fn persist(message: impl Into<String>) -> Self {
        Self::Persist {
            message: message.into(),
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur inside a thumbnail cache. Callers of the cache
/// port never see these; they are logged and swallowed.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Payload is larger than the whole quota.
    #[error("entry of {size} bytes exceeds quota of {quota} bytes")]
    TooLarge {
        /// Payload length.
        size: u64,
        /// Configured quota.
        quota: u64,
    },
    /// Metadata sidecar could not be read or written.
    #[error("metadata error: {0}")]
    Metadata(String),
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
}
