//! Remote API error types.

use thiserror::Error;

/// Failure reported by a remote collaborator.
///
/// `Transient` failures are retried under backoff; `Permanent` failures are
/// terminal for the item and surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Timeouts, connection failures, throttling and server errors.
    #[error("transient remote failure: {message}")]
    Transient {
        /// What went wrong.
        message: String,
        /// Response status, absent for transport failures.
        status: Option<u16>,
    },

    /// Client errors that a retry cannot fix.
    #[error("remote rejected request ({status}): {message}")]
    Permanent {
        /// Server-provided reason.
        message: String,
        /// Rejecting HTTP status.
        status: u16,
    },
}

impl RemoteError {
    /// Transient failure without an HTTP status.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            status: None,
        }
    }

    /// Permanent failure with the rejecting status.
    #[must_use]
    pub fn permanent(status: u16, message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            status,
        }
    }

    /// Classifies an HTTP status: 408, 429 and 5xx are retryable, any other
    /// non-success status is not.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 | 500..=599 => Self::Transient {
                message,
                status: Some(status),
            },
            _ => Self::Permanent { message, status },
        }
    }

    /// Returns true when the item should be retried under backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// HTTP status, if the failure came from a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } => *status,
            Self::Permanent { status, .. } => Some(*status),
        }
    }
}
