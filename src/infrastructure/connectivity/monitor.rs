use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace};

use crate::domain::ports::ConnectivityProbe;
use crate::domain::{Connectivity, ConnectivityEvent};

/// Confirmed connectivity transitions. Ends only when the monitor task does.
pub type ConnectivityStream = BoxStream<'static, ConnectivityEvent>;

const EVENT_BUFFER: usize = 16;

/// Polling and debounce timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between checks.
    pub poll_interval: Duration,
    /// A changed reading must still hold after this long to be reported.
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            debounce: Duration::from_secs(2),
        }
    }
}

impl MonitorConfig {
    /// Sets the polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the debounce window. Zero reports every change.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Polls a [`ConnectivityProbe`] and turns readings into debounced
/// [`ConnectivityEvent`]s.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    config: MonitorConfig,
}

impl ConnectivityMonitor {
    /// Monitor over `probe`. Nothing runs until [`Self::start`].
    #[must_use]
    pub fn new(probe: Arc<dyn ConnectivityProbe>, config: MonitorConfig) -> Self {
        Self { probe, config }
    }

    /// Probes once, then spawns the polling task.
    ///
    /// Returns the initial reading and the transition stream. The monitor is
    /// consumed, so a stream cannot be restarted; dropping it stops polling.
    pub async fn start(self) -> (Connectivity, ConnectivityStream) {
        let initial = Connectivity::from_reachable(self.probe.is_reachable().await);
        info!(connectivity = %initial, "Initial connectivity");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(poll_loop(self.probe, self.config, initial, tx));

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        (initial, stream)
    }
}

async fn poll_loop(
    probe: Arc<dyn ConnectivityProbe>,
    config: MonitorConfig,
    initial: Connectivity,
    tx: mpsc::Sender<ConnectivityEvent>,
) {
    let poll = config.poll_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + poll, poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut current = initial;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = tx.closed() => break,
        }

        let reading = Connectivity::from_reachable(probe.is_reachable().await);
        if reading == current {
            continue;
        }

        if !config.debounce.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(config.debounce) => {}
                () = tx.closed() => break,
            }
            let confirmed = Connectivity::from_reachable(probe.is_reachable().await);
            if confirmed != reading {
                trace!(reading = %reading, "Connectivity flap ignored");
                continue;
            }
        }

        let Some(event) = ConnectivityEvent::between(current, reading) else {
            continue;
        };
        current = reading;
        info!(connectivity = %current, "Connectivity changed");
        if tx.send(event).await.is_err() {
            break;
        }
    }

    debug!("Connectivity monitor stopped");
}
