//! Entry point the UI talks to.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::services::{
    CompressError, DisplayImage, DrainReport, ImageDisplayAdapter, LocalPreview, PhotoCompressor,
    RetryPolicy, SyncEvent, SyncOrchestrator,
};
use crate::domain::entities::{
    CacheEntry, PendingUpload, ResourceId, SizeVariant, SyncState, TargetRef, UploadId, UploadKind,
};
use crate::domain::errors::{CacheError, StoreError};
use crate::domain::ports::{
    ConnectivityProbe, ImageSourcePort, RemoteRecordPort, ThumbnailCachePort,
};
use crate::infrastructure::connectivity::{ConnectivityMonitor, MonitorConfig};
use crate::infrastructure::image::{DiskThumbnailCache, MemoryThumbnailCache, TieredThumbnailCache};
use crate::infrastructure::queue::PendingUploadStore;

/// Errors surfaced by [`SyncEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The upload could not be stored or changed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The thumbnail cache directory could not be opened.
    #[error("failed to open thumbnail cache: {0}")]
    Cache(#[from] CacheError),
    /// The capture is not a usable image.
    #[error(transparent)]
    Compress(#[from] CompressError),
}

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Holds `thumbnails/` and `queue/`.
    pub data_dir: PathBuf,
    /// Disk cache quota.
    pub cache_quota_bytes: u64,
    /// Entries kept in the memory cache tier.
    pub memory_entries: usize,
    /// Backoff for transient delivery failures.
    pub retry: RetryPolicy,
    /// Connectivity polling and debounce.
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            cache_quota_bytes: crate::infrastructure::image::DEFAULT_QUOTA_BYTES,
            memory_entries: crate::infrastructure::image::DEFAULT_CACHE_SIZE,
            retry: RetryPolicy::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Offline-first media subsystem: durable upload queue, background sync,
/// and cache-first image display.
pub struct SyncEngine {
    orchestrator: Arc<SyncOrchestrator>,
    store: Arc<PendingUploadStore>,
    cache: Arc<TieredThumbnailCache>,
    display: ImageDisplayAdapter,
    compressor: PhotoCompressor,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Opens local storage, probes connectivity once, and starts the
    /// background sync task. Uploads left over from a previous run are
    /// drained right away when online.
    ///
    /// # Errors
    /// Returns error if the queue or cache directory cannot be opened.
    pub async fn start(
        config: EngineConfig,
        remote: Arc<dyn RemoteRecordPort>,
        images: Arc<dyn ImageSourcePort>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(PendingUploadStore::open(config.data_dir.join("queue")).await?);
        let disk = Arc::new(
            DiskThumbnailCache::new(config.data_dir.join("thumbnails"), config.cache_quota_bytes)
                .await?,
        );
        let cache = Arc::new(TieredThumbnailCache::new(
            MemoryThumbnailCache::new(config.memory_entries),
            disk,
        ));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            remote,
            cache.clone(),
            config.retry,
        ));

        let (initial, events) = ConnectivityMonitor::new(probe, config.monitor)
            .start()
            .await;
        orchestrator.set_connectivity(initial).await;

        let handle = tokio::spawn(orchestrator.clone().run(events));

        let display = ImageDisplayAdapter::new(cache.clone(), images, store.clone());
        info!(
            data_dir = ?config.data_dir,
            state = %orchestrator.state(),
            "Sync engine started"
        );

        Ok(Self {
            orchestrator,
            store,
            cache,
            display,
            compressor: PhotoCompressor::default(),
            run_handle: Mutex::new(Some(handle)),
        })
    }

    /// Durably queues an already-encoded payload and kicks off delivery
    /// when online. Returns once the upload is on disk.
    ///
    /// # Errors
    /// Returns error if the upload could not be persisted.
    pub async fn enqueue_upload(
        &self,
        kind: UploadKind,
        target: TargetRef,
        payload: Bytes,
        mime_type: &str,
    ) -> Result<UploadId, EngineError> {
        let id = self.store.enqueue(kind, target, payload, mime_type).await?;
        self.orchestrator.refresh().await;
        self.orchestrator.trigger_drain();
        Ok(id)
    }

    /// Compresses a camera capture, then queues it.
    ///
    /// # Errors
    /// Returns error if the capture is not an image or cannot be persisted.
    pub async fn capture_photo(
        &self,
        kind: UploadKind,
        target: TargetRef,
        raw: Bytes,
    ) -> Result<UploadId, EngineError> {
        let photo = self.compressor.compress(raw).await?;
        self.enqueue_upload(kind, target, photo.bytes, photo.mime_type)
            .await
    }

    /// Current sync state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.orchestrator.state()
    }

    /// Receiver that sees every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.orchestrator.subscribe()
    }

    /// Per-item delivery events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.orchestrator.events()
    }

    /// Drains the queue now and waits for the cycle to end. While a drain
    /// is already running this returns immediately.
    pub async fn sync_now(&self) -> DrainReport {
        self.orchestrator.drain().await
    }

    /// Cache lookup only; never touches the network.
    pub async fn cached_thumbnail(
        &self,
        resource_id: &ResourceId,
        variant: SizeVariant,
    ) -> Option<CacheEntry> {
        self.cache.get(resource_id, variant).await
    }

    /// Resolves an image reference for display.
    pub async fn image(&self, reference: &str, variant: SizeVariant) -> DisplayImage {
        self.display.resolve(reference, variant).await
    }

    /// Uploads waiting for manual retry or discard, oldest first.
    pub async fn failed_uploads(&self) -> Vec<PendingUpload> {
        self.store.failed().await
    }

    /// Re-queues a failed upload with a fresh attempt budget and starts a
    /// drain when online.
    ///
    /// # Errors
    /// Returns error unless the upload exists and is failed.
    pub async fn retry_failed(&self, id: UploadId) -> Result<(), EngineError> {
        self.store.retry_failed(id).await?;
        self.orchestrator.refresh().await;
        self.orchestrator.trigger_drain();
        Ok(())
    }

    /// Deletes an upload that will not be delivered.
    ///
    /// # Errors
    /// Returns error if the upload is unknown or currently in flight.
    pub async fn discard(&self, id: UploadId) -> Result<(), EngineError> {
        self.store.discard(id).await?;
        self.orchestrator.refresh().await;
        Ok(())
    }

    /// Local copy of a photo still queued for `target`.
    pub async fn pending_for(&self, target: &TargetRef) -> Option<LocalPreview> {
        self.display.local_preview(target).await
    }

    /// Stops the background task after the current item.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown();
        let handle = self.run_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sync task ended abnormally");
            }
        }
        debug!("Sync engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Connectivity;
    use crate::domain::entities::UploadStatus;
    use crate::domain::errors::RemoteError;
    use crate::domain::ports::mocks::{MockImageSourcePort, RecordingRemote};
    use crate::infrastructure::connectivity::ManualProbe;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn config(dir: &TempDir) -> EngineConfig {
        let mut config = EngineConfig::new(dir.path().to_path_buf());
        config.retry = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(5))
            .with_jitter(Duration::ZERO);
        config.monitor = MonitorConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_debounce(Duration::ZERO);
        config
    }

    async fn start(
        dir: &TempDir,
        remote: Arc<RecordingRemote>,
        online: bool,
    ) -> (SyncEngine, Arc<ManualProbe>) {
        let probe = Arc::new(ManualProbe::new(online));
        let engine = SyncEngine::start(
            config(dir),
            remote,
            Arc::new(MockImageSourcePort::new()),
            probe.clone(),
        )
        .await
        .unwrap();
        (engine, probe)
    }

    async fn settled(engine: &SyncEngine) {
        let mut state = engine.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| s.pending_count == 0 && !s.is_draining()),
        )
        .await
        .unwrap()
        .unwrap();
    }

    fn target(record_id: &str) -> TargetRef {
        TargetRef::new("project_stages", record_id, "photo")
    }

    #[tokio::test]
    async fn test_online_enqueue_is_delivered() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(RecordingRemote::new());
        let (engine, _) = start(&dir, remote.clone(), true).await;

        assert_ok!(
            engine
                .enqueue_upload(UploadKind::StagePhoto, target("1"), Bytes::from_static(b"jpeg"), "image/jpeg")
                .await
        );
        settled(&engine).await;

        assert_eq!(remote.delivered_records(), vec!["1"]);
        let path = target("1").object_path(&UploadKind::StagePhoto, "image/jpeg");
        assert!(engine.cached_thumbnail(&path, SizeVariant::Full).await.is_some());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(RecordingRemote::new());

        let (engine, _) = start(&dir, remote.clone(), false).await;
        engine
            .enqueue_upload(UploadKind::StagePhoto, target("1"), Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(engine.sync_state().connectivity, Connectivity::Offline);
        assert_eq!(engine.sync_state().pending_count, 1);
        engine.shutdown().await;
        drop(engine);

        let (engine, _) = start(&dir, remote.clone(), true).await;
        settled(&engine).await;
        assert_eq!(remote.delivered_records(), vec!["1"]);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_upload_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(RecordingRemote::new());
        remote.fail_next("1", [RemoteError::permanent(409, "conflict")]);
        let (engine, _) = start(&dir, remote.clone(), true).await;

        let id = engine
            .enqueue_upload(UploadKind::StagePhoto, target("1"), Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        settled(&engine).await;

        let failed = engine.failed_uploads().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, UploadStatus::Failed);
        assert_eq!(engine.sync_state().failed_count, 1);

        engine.retry_failed(id).await.unwrap();
        settled(&engine).await;

        assert!(engine.failed_uploads().await.is_empty());
        assert_eq!(remote.delivered_records(), vec!["1"]);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_discard_and_preview() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = start(&dir, Arc::new(RecordingRemote::new()), false).await;

        let id = engine
            .enqueue_upload(UploadKind::StagePhoto, target("9"), Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();
        let preview = engine.pending_for(&target("9")).await.unwrap();
        assert_eq!(preview.status, UploadStatus::Queued);

        engine.discard(id).await.unwrap();
        assert!(engine.pending_for(&target("9")).await.is_none());
        assert_eq!(engine.sync_state().pending_count, 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_capture_rejects_non_image() {
        let dir = TempDir::new().unwrap();
        let (engine, _) = start(&dir, Arc::new(RecordingRemote::new()), false).await;

        let result = engine
            .capture_photo(UploadKind::StagePhoto, target("1"), Bytes::from_static(b"nope"))
            .await;

        assert!(matches!(result, Err(EngineError::Compress(_))));
        assert_eq!(engine.sync_state().pending_count, 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_sync_now_offline_is_noop() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(RecordingRemote::new());
        let (engine, probe) = start(&dir, remote.clone(), false).await;
        engine
            .enqueue_upload(UploadKind::StagePhoto, target("1"), Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        let report = engine.sync_now().await;
        assert_eq!(report.delivered, 0);

        probe.set_reachable(true);
        settled(&engine).await;
        assert_eq!(remote.delivered_records(), vec!["1"]);
        engine.shutdown().await;
    }
}
