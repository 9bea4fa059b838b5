//! Drains the pending-upload store against the remote backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::retry_policy::RetryPolicy;
use crate::domain::entities::{
    DrainProgress, PendingUpload, SizeVariant, SyncPhase, SyncState, TargetRef, UploadId,
    UploadKind, UploadStatus,
};
use crate::domain::errors::{RemoteError, StoreError};
use crate::domain::ports::{BlobRef, RemoteRecordPort, ThumbnailCachePort};
use crate::domain::{Connectivity, ConnectivityEvent};
use crate::infrastructure::queue::PendingUploadStore;

const EVENT_CAPACITY: usize = 64;

/// Per-item notifications emitted while draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The remote acknowledged the write and the record was removed.
    Delivered {
        /// Delivered upload.
        id: UploadId,
        /// Record slot that now points at the blob.
        target: TargetRef,
        /// Object written to the store.
        blob: BlobRef,
    },
    /// A transient failure; the item goes back to the queue.
    Retrying {
        /// Upload that failed.
        id: UploadId,
        /// Attempts made so far.
        attempts: u32,
        /// Backoff before the next item of this kind.
        delay: Duration,
    },
    /// The item was marked failed and waits for manual action.
    /// `terminal` is set when the remote rejected it outright rather than
    /// after running out of attempts.
    Failed {
        /// Upload that gave up.
        id: UploadId,
        /// Last error.
        reason: String,
        /// Rejected outright instead of exhausting retries.
        terminal: bool,
    },
}

/// Why a drain cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStop {
    /// Nothing deliverable is left.
    QueueEmpty,
    /// Another drain holds the guard.
    AlreadyDraining,
    /// Connectivity was lost.
    Offline,
    /// Shutdown was requested.
    Shutdown,
    /// The local store failed; see the logs.
    StoreError,
}

/// Summary of one drain cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Items acknowledged by the remote.
    pub delivered: usize,
    /// Transient failures sent back to the queue.
    pub retried: usize,
    /// Items marked failed.
    pub failed: usize,
    /// Why the cycle ended.
    pub stop: DrainStop,
}

impl DrainReport {
    const fn stopped(stop: DrainStop) -> Self {
        Self {
            delivered: 0,
            retried: 0,
            failed: 0,
            stop,
        }
    }
}

enum Pick {
    Ready(PendingUpload),
    Deferred(Instant),
    Empty,
}

/// What happened to a single picked record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ItemOutcome {
    Delivered,
    Retrying,
    Failed,
    /// Discarded or re-queued by someone else between pick and send.
    Skipped,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sequential, FIFO delivery of queued uploads with bounded retries.
///
/// At most one remote write is in flight. Transient failures defer the
/// next item of the same kind by the backoff delay; items of other kinds
/// keep flowing.
pub struct SyncOrchestrator {
    store: Arc<PendingUploadStore>,
    remote: Arc<dyn RemoteRecordPort>,
    cache: Arc<dyn ThumbnailCachePort>,
    policy: RetryPolicy,
    draining: AtomicBool,
    online: AtomicBool,
    stop_tx: watch::Sender<bool>,
    wake: Notify,
    deferred: Mutex<HashMap<UploadKind, Instant>>,
    state_tx: watch::Sender<SyncState>,
    events_tx: broadcast::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    /// Orchestrator that starts offline and idle.
    #[must_use]
    pub fn new(
        store: Arc<PendingUploadStore>,
        remote: Arc<dyn RemoteRecordPort>,
        cache: Arc<dyn ThumbnailCachePort>,
        policy: RetryPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            remote,
            cache,
            policy,
            draining: AtomicBool::new(false),
            online: AtomicBool::new(false),
            stop_tx: watch::Sender::new(false),
            wake: Notify::new(),
            deferred: Mutex::new(HashMap::new()),
            state_tx,
            events_tx,
        }
    }

    /// The backing queue.
    #[must_use]
    pub fn store(&self) -> &Arc<PendingUploadStore> {
        &self.store
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state_tx.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Receiver for per-item events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events_tx.subscribe()
    }

    /// Returns true when the last reading was online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns true while a drain cycle holds the guard.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Records a connectivity reading. Going offline cuts a backoff wait
    /// short; the in-flight attempt, if any, completes.
    pub async fn set_connectivity(&self, connectivity: Connectivity) {
        let was_online = self
            .online
            .swap(connectivity.is_online(), Ordering::SeqCst);
        if was_online != connectivity.is_online() {
            info!(connectivity = %connectivity, "Sync connectivity updated");
        }
        if !connectivity.is_online() {
            self.wake.notify_one();
        }
        self.publish(|state| state.connectivity = connectivity).await;
    }

    /// Recomputes counts from the store and publishes them.
    pub async fn refresh(&self) {
        self.publish(|_| {}).await;
    }

    /// Stops draining after the current item and ends [`Self::run`].
    pub fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        self.wake.notify_one();
    }

    fn is_shutdown(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Starts a drain cycle in the background. No-op while one is running.
    pub fn trigger_drain(self: &Arc<Self>) {
        if self.is_draining() || !self.is_online() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let report = this.drain().await;
            debug!(?report, "Background drain finished");
        });
    }

    /// Reacts to connectivity transitions until the stream ends or
    /// [`Self::shutdown`] is called.
    pub async fn run<S>(self: Arc<Self>, events: S)
    where
        S: Stream<Item = ConnectivityEvent> + Send + Unpin,
    {
        let mut events = events;
        let mut stop = self.stop_tx.subscribe();
        if self.is_online() {
            self.trigger_drain();
        }

        loop {
            if *stop.borrow() {
                break;
            }
            let event = tokio::select! {
                event = events.next() => event,
                _ = stop.changed() => continue,
            };
            let Some(event) = event else {
                break;
            };

            self.set_connectivity(event.connectivity()).await;
            if event == ConnectivityEvent::BecameOnline {
                self.trigger_drain();
            }
        }

        debug!("Sync orchestrator stopped");
    }

    /// Delivers queued uploads until the queue is empty, connectivity is
    /// lost, or shutdown is requested. A second concurrent call returns
    /// immediately with [`DrainStop::AlreadyDraining`].
    pub async fn drain(&self) -> DrainReport {
        if self.is_shutdown() {
            return DrainReport::stopped(DrainStop::Shutdown);
        }
        if !self.is_online() {
            debug!("Drain skipped, offline");
            return DrainReport::stopped(DrainStop::Offline);
        }

        let mut total = DrainReport::stopped(DrainStop::QueueEmpty);
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!("Drain already running");
                return DrainReport::stopped(DrainStop::AlreadyDraining);
            }

            let report = {
                let _guard = DrainGuard(&self.draining);
                self.drain_cycle().await
            };
            self.publish(|state| {
                state.phase = SyncPhase::Idle;
                state.progress = None;
                state.in_flight = None;
            })
            .await;

            total.delivered += report.delivered;
            total.retried += report.retried;
            total.failed += report.failed;
            total.stop = report.stop;

            // An enqueue that lost the race with the end of the cycle is
            // picked up here instead of waiting for the next trigger.
            let raced = report.stop == DrainStop::QueueEmpty
                && self.is_online()
                && self.store.counts().await.queued > 0;
            if !raced {
                break;
            }
        }

        info!(
            delivered = total.delivered,
            retried = total.retried,
            failed = total.failed,
            stop = ?total.stop,
            "Drain cycle finished"
        );
        total
    }

    async fn drain_cycle(&self) -> DrainReport {
        let mut report = DrainReport::stopped(DrainStop::QueueEmpty);
        let mut progress = DrainProgress {
            completed: 0,
            total: self.store.counts().await.queued,
        };
        self.publish(|state| {
            state.phase = SyncPhase::Draining;
            state.progress = Some(progress);
        })
        .await;

        loop {
            if self.is_shutdown() {
                report.stop = DrainStop::Shutdown;
                break;
            }
            if !self.is_online() {
                report.stop = DrainStop::Offline;
                break;
            }

            let record = match self.pick_next().await {
                Pick::Ready(record) => record,
                Pick::Deferred(until) => {
                    debug!(wait_ms = until.saturating_duration_since(Instant::now()).as_millis(), "Waiting for backoff");
                    tokio::select! {
                        () = tokio::time::sleep_until(until) => {}
                        () = self.wake.notified() => {}
                    }
                    continue;
                }
                Pick::Empty => break,
            };

            match self.deliver(record).await {
                Ok(ItemOutcome::Delivered) => {
                    report.delivered += 1;
                    progress.completed += 1;
                }
                Ok(ItemOutcome::Failed) => {
                    report.failed += 1;
                    progress.completed += 1;
                }
                Ok(ItemOutcome::Retrying) => report.retried += 1,
                Ok(ItemOutcome::Skipped) => continue,
                Err(e) => {
                    error!(error = %e, "Upload store failed during drain, ending cycle");
                    report.stop = DrainStop::StoreError;
                    break;
                }
            }

            let queued = self.store.counts().await.queued;
            progress.total = progress.total.max(progress.completed + queued);
            self.publish(|state| {
                state.progress = Some(progress);
                state.in_flight = None;
            })
            .await;
        }

        report
    }

    /// Oldest queued record whose kind is not in backoff.
    async fn pick_next(&self) -> Pick {
        let deferred = self.deferred.lock().clone();
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;

        for record in self.store.list_pending().await {
            if record.status != UploadStatus::Queued {
                continue;
            }
            match deferred.get(&record.kind) {
                Some(&until) if until > now => {
                    earliest = Some(earliest.map_or(until, |e| e.min(until)));
                }
                _ => return Pick::Ready(record),
            }
        }

        earliest.map_or(Pick::Empty, Pick::Deferred)
    }

    /// Runs one delivery attempt. A store error after the record went in
    /// flight hands it back to the queue before surfacing.
    pub(super) async fn deliver(&self, record: PendingUpload) -> Result<ItemOutcome, StoreError> {
        let id = record.id;
        match self.store.mark_in_flight(id).await {
            Ok(()) => {}
            Err(e @ (StoreError::NotFound(_) | StoreError::InvalidState { .. })) => {
                debug!(id = %id, error = %e, "Upload changed before delivery, skipping");
                return Ok(ItemOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }
        self.publish(|state| state.in_flight = Some(id)).await;

        let outcome = self.attempt(record).await;
        if outcome.is_err() {
            self.store.release_in_flight(id).await;
        }
        outcome
    }

    async fn attempt(&self, record: PendingUpload) -> Result<ItemOutcome, StoreError> {
        let id = record.id;
        let payload = match self.store.payload(id).await {
            Ok(payload) => payload,
            Err(e) => {
                let reason = format!("payload unreadable: {e}");
                self.store.mark_failed(id, &reason).await?;
                self.emit(SyncEvent::Failed {
                    id,
                    reason,
                    terminal: true,
                });
                return Ok(ItemOutcome::Failed);
            }
        };

        let path = record.object_path();
        debug!(id = %id, path = %path, attempts = record.attempts, "Delivering upload");

        match self.send(&record, payload.clone()).await {
            Ok(blob) => {
                self.store.remove(id).await?;
                self.deferred.lock().remove(&record.kind);
                self.cache.invalidate(&path).await;
                self.cache
                    .set(&path, SizeVariant::Full, payload, &record.mime_type)
                    .await;
                info!(id = %id, target = %record.target, blob = %blob, "Upload delivered");
                self.emit(SyncEvent::Delivered {
                    id,
                    target: record.target,
                    blob,
                });
                Ok(ItemOutcome::Delivered)
            }
            Err(e) if e.is_retryable() => self.handle_transient(&record, &e).await,
            Err(e) => {
                self.store.increment_attempts(id).await?;
                let reason = e.to_string();
                self.store.mark_failed(id, &reason).await?;
                self.emit(SyncEvent::Failed {
                    id,
                    reason,
                    terminal: true,
                });
                Ok(ItemOutcome::Failed)
            }
        }
    }

    async fn send(&self, record: &PendingUpload, payload: Bytes) -> Result<BlobRef, RemoteError> {
        let blob = self
            .remote
            .upload_blob(&record.object_path(), payload, &record.mime_type)
            .await?;
        self.remote
            .attach_upload_to_target(&record.target, &blob)
            .await?;
        Ok(blob)
    }

    async fn handle_transient(
        &self,
        record: &PendingUpload,
        error: &RemoteError,
    ) -> Result<ItemOutcome, StoreError> {
        let id = record.id;
        let reason = error.to_string();
        let attempts = self.store.increment_attempts(id).await?;

        if self.policy.is_exhausted(attempts) {
            self.store.mark_failed(id, &reason).await?;
            self.emit(SyncEvent::Failed {
                id,
                reason,
                terminal: false,
            });
            return Ok(ItemOutcome::Failed);
        }

        self.store.set_last_error(id, &reason).await?;
        self.store.mark_queued(id).await?;
        let delay = self.policy.delay_for(attempts);
        self.deferred
            .lock()
            .insert(record.kind.clone(), Instant::now() + delay);
        warn!(
            id = %id,
            attempts,
            delay_ms = delay.as_millis(),
            error = %error,
            "Upload failed, will retry"
        );
        self.emit(SyncEvent::Retrying {
            id,
            attempts,
            delay,
        });
        Ok(ItemOutcome::Retrying)
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn publish(&self, change: impl FnOnce(&mut SyncState)) {
        let counts = self.store.counts().await;
        self.state_tx.send_modify(|state| {
            change(state);
            state.pending_count = counts.pending();
            state.failed_count = counts.failed;
        });
    }
}
