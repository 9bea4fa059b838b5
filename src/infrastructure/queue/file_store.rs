//! File-backed pending-upload store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::entities::{PendingUpload, TargetRef, UploadId, UploadKind, UploadStatus};
use crate::domain::errors::StoreError;
use crate::infrastructure::storage::{remove_if_exists, write_atomic};

const RECORD_EXTENSION: &str = "json";
const PAYLOAD_EXTENSION: &str = "bin";
const CORRUPT_EXTENSION: &str = "corrupt";

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Waiting for delivery.
    pub queued: usize,
    /// Being delivered.
    pub in_flight: usize,
    /// Waiting for manual action.
    pub failed: usize,
}

impl QueueCounts {
    /// Records that have not reached the remote and are not stuck.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.queued + self.in_flight
    }

    /// Every record in the store.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.queued + self.in_flight + self.failed
    }
}

#[derive(Default)]
struct QueueIndex {
    records: HashMap<UploadId, PendingUpload>,
    next_sequence: u64,
}

impl QueueIndex {
    fn get(&self, id: UploadId) -> Result<&PendingUpload, StoreError> {
        self.records.get(&id).ok_or(StoreError::NotFound(id))
    }

    fn ordered(&self) -> Vec<PendingUpload> {
        let mut records: Vec<PendingUpload> = self.records.values().cloned().collect();
        records.sort_by_key(PendingUpload::fifo_key);
        records
    }
}

/// Durable FIFO of deferred uploads.
///
/// Every record is a JSON file with its payload in a sibling `.bin` file.
/// The payload is written first and the record last, so a record on disk
/// always has its payload. Deleting the record is the commit point of
/// `remove`. A single mutex serializes all writers.
pub struct PendingUploadStore {
    queue_dir: PathBuf,
    index: Mutex<QueueIndex>,
}

impl PendingUploadStore {
    /// Opens the store, recovering from an interrupted previous run:
    /// records left `in-flight` go back to `queued`, payloads without a
    /// record are deleted, unreadable records are set aside as `.corrupt`.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or listed, or a
    /// recovered record cannot be rewritten.
    pub async fn open(queue_dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&queue_dir).await?;

        let mut index = QueueIndex::default();
        let mut payload_files = Vec::new();
        let mut entries = fs::read_dir(&queue_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(RECORD_EXTENSION) => {}
                Some(PAYLOAD_EXTENSION) => {
                    payload_files.push(path);
                    continue;
                }
                _ => continue,
            }

            let record = match read_record(&path).await {
                Ok(record) => record,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Setting aside unreadable upload record");
                    let _ = fs::rename(&path, path.with_extension(CORRUPT_EXTENSION)).await;
                    continue;
                }
            };
            index.next_sequence = index.next_sequence.max(record.sequence + 1);
            index.records.insert(record.id, record);
        }

        let store = Self {
            queue_dir,
            index: Mutex::new(QueueIndex::default()),
        };

        for path in payload_files {
            let owned = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(UploadId::parse)
                .is_some_and(|id| index.records.contains_key(&id));
            if !owned {
                warn!(path = %path.display(), "Removing orphaned upload payload");
                remove_if_exists(&path).await?;
            }
        }

        let ids: Vec<UploadId> = index.records.keys().copied().collect();
        for id in ids {
            let Some(record) = index.records.get(&id).cloned() else {
                continue;
            };
            let payload_len = fs::metadata(store.payload_path(id)).await.map(|m| m.len());

            let mut recovered = record.clone();
            match payload_len {
                Ok(len) if len == record.size_bytes => {}
                _ => {
                    error!(id = %id, "Upload payload missing or truncated");
                    recovered.status = UploadStatus::Failed;
                    recovered.last_error = Some("local payload missing or truncated".to_string());
                }
            }
            if recovered.status == UploadStatus::InFlight {
                info!(id = %id, "Re-queueing upload interrupted mid-flight");
                recovered.status = UploadStatus::Queued;
            }

            if recovered != record {
                store.write_record(&recovered).await?;
                index.records.insert(id, recovered);
            }
        }

        let counts = count(&index);
        info!(
            queued = counts.queued,
            failed = counts.failed,
            dir = %store.queue_dir.display(),
            "Opened pending-upload store"
        );

        *store.index.lock().await = index;
        Ok(store)
    }

    /// Returns the directory holding the queue.
    #[must_use]
    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    fn record_path(&self, id: UploadId) -> PathBuf {
        self.queue_dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn payload_path(&self, id: UploadId) -> PathBuf {
        self.queue_dir.join(format!("{id}.{PAYLOAD_EXTENSION}"))
    }

    async fn write_record(&self, record: &PendingUpload) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::persist(format!("serialize record: {e}")))?;
        write_atomic(self.record_path(record.id), json)
            .await
            .map_err(|e| StoreError::persist(format!("write record {}: {e}", record.id)))
    }

    /// Durably appends an upload. When this returns `Ok`, the upload
    /// survives a process restart.
    ///
    /// # Errors
    /// Returns error if the payload or record cannot be persisted; the
    /// upload is then *not* queued.
    pub async fn enqueue(
        &self,
        kind: UploadKind,
        target: TargetRef,
        payload: Bytes,
        mime_type: &str,
    ) -> Result<UploadId, StoreError> {
        let mut index = self.index.lock().await;

        let record = PendingUpload {
            id: UploadId::generate(),
            kind,
            target,
            mime_type: mime_type.to_string(),
            size_bytes: payload.len() as u64,
            attempts: 0,
            status: UploadStatus::Queued,
            last_error: None,
            enqueued_at: Utc::now(),
            sequence: index.next_sequence,
        };

        write_atomic(self.payload_path(record.id), payload.to_vec())
            .await
            .map_err(|e| StoreError::persist(format!("write payload {}: {e}", record.id)))?;

        if let Err(e) = self.write_record(&record).await {
            let _ = remove_if_exists(&self.payload_path(record.id)).await;
            return Err(e);
        }

        index.next_sequence += 1;
        info!(
            id = %record.id,
            kind = %record.kind,
            target = %record.target,
            size = record.size_bytes,
            "Upload queued"
        );
        let id = record.id;
        index.records.insert(id, record);
        Ok(id)
    }

    /// Every record in FIFO order, whatever its status.
    pub async fn list_pending(&self) -> Vec<PendingUpload> {
        self.index.lock().await.ordered()
    }

    /// Oldest record still waiting for delivery.
    pub async fn next_queued(&self) -> Option<PendingUpload> {
        self.index
            .lock()
            .await
            .ordered()
            .into_iter()
            .find(|r| r.status == UploadStatus::Queued)
    }

    /// Records that need manual action, oldest first.
    pub async fn failed(&self) -> Vec<PendingUpload> {
        self.index
            .lock()
            .await
            .ordered()
            .into_iter()
            .filter(|r| r.status == UploadStatus::Failed)
            .collect()
    }

    /// Record by id, whatever its status.
    pub async fn get(&self, id: UploadId) -> Option<PendingUpload> {
        self.index.lock().await.records.get(&id).cloned()
    }

    /// Most recently enqueued record for a target slot.
    pub async fn find_by_target(&self, target: &TargetRef) -> Option<PendingUpload> {
        self.index
            .lock()
            .await
            .records
            .values()
            .filter(|r| &r.target == target)
            .max_by_key(|r| r.fifo_key())
            .cloned()
    }

    /// Loads the payload of a record.
    ///
    /// # Errors
    /// Returns error if the record is unknown or the payload unreadable.
    pub async fn payload(&self, id: UploadId) -> Result<Bytes, StoreError> {
        let index = self.index.lock().await;
        index.get(id)?;
        let bytes = fs::read(self.payload_path(id)).await?;
        Ok(Bytes::from(bytes))
    }

    /// Records per status.
    pub async fn counts(&self) -> QueueCounts {
        count(&*self.index.lock().await)
    }

    /// Applies `change` to a copy of the record, persists it, then
    /// publishes it to the index.
    async fn update<F>(&self, id: UploadId, change: F) -> Result<PendingUpload, StoreError>
    where
        F: FnOnce(&mut PendingUpload) -> Result<(), StoreError>,
    {
        let mut index = self.index.lock().await;
        let mut record = index.get(id)?.clone();
        change(&mut record)?;
        self.write_record(&record).await?;
        index.records.insert(id, record.clone());
        Ok(record)
    }

    /// # Errors
    /// Returns error unless the record is `queued`, or on persist failure.
    pub async fn mark_in_flight(&self, id: UploadId) -> Result<(), StoreError> {
        self.update(id, |record| {
            expect_status(record, UploadStatus::Queued, "queued")?;
            record.status = UploadStatus::InFlight;
            Ok(())
        })
        .await?;
        debug!(id = %id, "Upload in flight");
        Ok(())
    }

    /// Returns an in-flight record to the queue.
    ///
    /// # Errors
    /// Returns error unless the record is `in-flight`, or on persist failure.
    pub async fn mark_queued(&self, id: UploadId) -> Result<(), StoreError> {
        self.update(id, |record| {
            expect_status(record, UploadStatus::InFlight, "in-flight")?;
            record.status = UploadStatus::Queued;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Puts an `in-flight` record back in the queue after its attempt was
    /// cut short by a local error. The index is updated even when the
    /// record file cannot be rewritten; `open` re-queues it from disk.
    pub async fn release_in_flight(&self, id: UploadId) {
        let mut index = self.index.lock().await;
        let Some(record) = index.records.get_mut(&id) else {
            return;
        };
        if record.status != UploadStatus::InFlight {
            return;
        }
        record.status = UploadStatus::Queued;
        let record = record.clone();
        if let Err(e) = self.write_record(&record).await {
            warn!(id = %id, error = %e, "Re-queued upload in memory only");
        } else {
            debug!(id = %id, "Upload released back to queue");
        }
    }

    /// # Errors
    /// Returns error if the record is unknown or cannot be persisted.
    pub async fn mark_failed(&self, id: UploadId, reason: &str) -> Result<(), StoreError> {
        self.update(id, |record| {
            record.status = UploadStatus::Failed;
            record.last_error = Some(reason.to_string());
            Ok(())
        })
        .await?;
        warn!(id = %id, reason = reason, "Upload marked failed");
        Ok(())
    }

    /// Returns the new attempt count.
    ///
    /// # Errors
    /// Returns error if the record is unknown or cannot be persisted.
    pub async fn increment_attempts(&self, id: UploadId) -> Result<u32, StoreError> {
        let record = self
            .update(id, |record| {
                record.attempts = record.attempts.saturating_add(1);
                Ok(())
            })
            .await?;
        Ok(record.attempts)
    }

    /// Records the last delivery error without changing status.
    ///
    /// # Errors
    /// Returns error if the record is unknown or cannot be persisted.
    pub async fn set_last_error(&self, id: UploadId, reason: &str) -> Result<(), StoreError> {
        self.update(id, |record| {
            record.last_error = Some(reason.to_string());
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Deletes a delivered record and its payload.
    ///
    /// # Errors
    /// Returns error if the record is unknown or its file cannot be deleted.
    pub async fn remove(&self, id: UploadId) -> Result<(), StoreError> {
        let mut index = self.index.lock().await;
        index.get(id)?;
        remove_if_exists(&self.record_path(id)).await?;
        index.records.remove(&id);
        if let Err(e) = remove_if_exists(&self.payload_path(id)).await {
            warn!(id = %id, error = %e, "Failed to remove upload payload, will be cleaned on open");
        }
        debug!(id = %id, "Upload removed from store");
        Ok(())
    }

    /// Manual retry of a failed upload: back to `queued` with a fresh
    /// attempt budget.
    ///
    /// # Errors
    /// Returns error unless the record is `failed`, or on persist failure.
    pub async fn retry_failed(&self, id: UploadId) -> Result<(), StoreError> {
        self.update(id, |record| {
            expect_status(record, UploadStatus::Failed, "failed")?;
            record.status = UploadStatus::Queued;
            record.attempts = 0;
            record.last_error = None;
            Ok(())
        })
        .await?;
        info!(id = %id, "Failed upload re-queued by user");
        Ok(())
    }

    /// Manual deletion of an upload that will not be delivered.
    ///
    /// # Errors
    /// Returns error if the record is in flight, unknown, or cannot be
    /// deleted.
    pub async fn discard(&self, id: UploadId) -> Result<(), StoreError> {
        {
            let index = self.index.lock().await;
            let record = index.get(id)?;
            if record.status == UploadStatus::InFlight {
                return Err(StoreError::InvalidState {
                    id,
                    status: record.status.to_string(),
                    expected: "queued or failed",
                });
            }
        }
        self.remove(id).await?;
        info!(id = %id, "Upload discarded by user");
        Ok(())
    }
}

fn count(index: &QueueIndex) -> QueueCounts {
    index
        .records
        .values()
        .fold(QueueCounts::default(), |mut counts, record| {
            match record.status {
                UploadStatus::Queued => counts.queued += 1,
                UploadStatus::InFlight => counts.in_flight += 1,
                UploadStatus::Failed => counts.failed += 1,
            }
            counts
        })
}

fn expect_status(
    record: &PendingUpload,
    status: UploadStatus,
    expected: &'static str,
) -> Result<(), StoreError> {
    if record.status == status {
        Ok(())
    } else {
        Err(StoreError::InvalidState {
            id: record.id,
            status: record.status.to_string(),
            expected,
        })
    }
}

async fn read_record(path: &Path) -> Result<PendingUpload, StoreError> {
    let raw = fs::read(path).await?;
    serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
