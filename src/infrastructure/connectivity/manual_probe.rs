use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::ports::ConnectivityProbe;

/// Probe whose answer is set from outside, for platforms that push
/// reachability changes instead of being polled.
#[derive(Debug, Default)]
pub struct ManualProbe {
    reachable: AtomicBool,
}

impl ManualProbe {
    /// Probe that starts with the given answer.
    #[must_use]
    pub const fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    /// Sets the answer for later checks.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ConnectivityProbe for ManualProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
