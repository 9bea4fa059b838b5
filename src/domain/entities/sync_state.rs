//! Derived synchronization state shown to the UI.

use serde::Serialize;

use super::pending_upload::UploadId;
use crate::domain::connectivity::Connectivity;

/// Whether the orchestrator is currently working through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// Nothing queued, or offline.
    #[default]
    Idle,
    /// Delivering queued uploads.
    Draining,
}

/// Orchestrator state as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Backend unreachable; uploads wait locally.
    Offline,
    /// Online with nothing to deliver.
    Idle,
    /// Online and delivering.
    Draining,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Idle => write!(f, "idle"),
            Self::Draining => write!(f, "syncing"),
        }
    }
}

/// Progress of the current drain cycle. `completed` never decreases within
/// a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainProgress {
    /// Items finished this cycle, delivered or failed.
    pub completed: usize,
    /// Items known to the cycle so far.
    pub total: usize,
}

impl DrainProgress {
    /// Completion in percent; an empty cycle counts as done.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Read-only snapshot. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SyncState {
    /// Last confirmed reachability.
    pub connectivity: Connectivity,
    /// Whether a drain is running.
    pub phase: SyncPhase,
    /// Uploads still queued or in flight.
    pub pending_count: usize,
    /// Uploads that need manual action.
    pub failed_count: usize,
    /// Progress of the running drain.
    pub progress: Option<DrainProgress>,
    /// Upload currently being delivered.
    pub in_flight: Option<UploadId>,
}

impl SyncState {
    /// Status for display.
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        match (self.connectivity, self.phase) {
            (Connectivity::Offline, _) => SyncStatus::Offline,
            (Connectivity::Online, SyncPhase::Idle) => SyncStatus::Idle,
            (Connectivity::Online, SyncPhase::Draining) => SyncStatus::Draining,
        }
    }

    /// Returns true while a drain cycle runs.
    #[must_use]
    pub const fn is_draining(&self) -> bool {
        matches!(self.phase, SyncPhase::Draining)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} pending, {} failed)",
            self.status(),
            self.pending_count,
            self.failed_count
        )?;
        if let Some(progress) = self.progress {
            write!(f, " {:.0}%", progress.percent())?;
        }
        Ok(())
    }
}
