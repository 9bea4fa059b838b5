//! Network reachability port.

/// A boolean "is the remote reachable" signal.
#[async_trait::async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Checks reachability once. Must not hang longer than its own timeout.
    async fn is_reachable(&self) -> bool;
}
