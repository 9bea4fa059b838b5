//! Reachability probes and the debounced connectivity monitor.

mod http_probe;
mod manual_probe;
mod monitor;

pub use http_probe::{DEFAULT_PROBE_TIMEOUT, HttpReachabilityProbe};
pub use manual_probe::ManualProbe;
pub use monitor::{ConnectivityMonitor, ConnectivityStream, MonitorConfig};
