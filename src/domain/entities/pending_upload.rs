//! Deferred upload records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::cache_entry::ResourceId;

const TARGET_DIGEST_BYTES: usize = 6;

/// Locally generated identifier of a pending upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generates a fresh, never reused identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from its hyphenated form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// What a pending upload represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UploadKind {
    /// Photo documenting an installation stage.
    StagePhoto,
    /// Reserved for kinds written by newer clients.
    Other(String),
}

impl UploadKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::StagePhoto => "stage-photo",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for UploadKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stage-photo" => Self::StagePhoto,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for UploadKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<UploadKind> for String {
    fn from(kind: UploadKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for UploadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote entity an upload attaches to.
///
/// The same target always maps to the same remote object path, so
/// delivering an upload twice overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    /// Remote table or collection (e.g. `project_stages`).
    pub entity: String,
    /// Primary key of the record.
    pub record_id: String,
    /// Column / slot receiving the upload (e.g. `wiring_photo`).
    pub slot: String,
}

impl TargetRef {
    /// Builds a target from its three parts.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        record_id: impl Into<String>,
        slot: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            record_id: record_id.into(),
            slot: slot.into(),
        }
    }

    /// Deterministic object path for an upload of `kind` with `mime_type`.
    ///
    /// Segments are sanitized for readability and the file name carries a
    /// digest of the raw target, so two targets that sanitize alike still
    /// get different objects.
    #[must_use]
    pub fn object_path(&self, kind: &UploadKind, mime_type: &str) -> ResourceId {
        ResourceId::new(format!(
            "{}/{}/{}/{}-{}.{}",
            sanitize_segment(kind.as_str()),
            sanitize_segment(&self.entity),
            sanitize_segment(&self.record_id),
            sanitize_segment(&self.slot),
            self.fingerprint(),
            extension_for_mime(mime_type)
        ))
    }

    /// Short hex digest of the length-prefixed raw segments.
    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for segment in [&self.entity, &self.record_id, &self.slot] {
            hasher.update((segment.len() as u64).to_le_bytes());
            hasher.update(segment.as_bytes());
        }
        hex::encode(&hasher.finalize()[..TARGET_DIGEST_BYTES])
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.entity, self.record_id, self.slot)
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File extension for a MIME type, `bin` when unknown.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Delivery state of a pending upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    /// Waiting for the next drain.
    Queued,
    /// Currently being delivered.
    InFlight,
    /// Needs manual retry or deletion.
    Failed,
}

impl UploadStatus {
    /// Returns true while the upload still counts as outstanding work.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::InFlight => write!(f, "in-flight"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A deferred write. The payload lives next to the record on disk and is
/// loaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Local identifier, stable across restarts.
    pub id: UploadId,
    /// What the payload is.
    pub kind: UploadKind,
    /// Record slot the upload attaches to.
    pub target: TargetRef,
    /// Content type of the payload.
    pub mime_type: String,
    /// Payload length, checked against the file on open.
    pub size_bytes: u64,
    /// Delivery attempts so far, failed ones included.
    pub attempts: u32,
    /// Current delivery state.
    pub status: UploadStatus,
    /// Reason of the most recent failed attempt.
    #[serde(default)]
    pub last_error: Option<String>,
    /// When the upload was queued.
    pub enqueued_at: DateTime<Utc>,
    /// FIFO tie-breaker for uploads queued in the same instant.
    pub sequence: u64,
}

impl PendingUpload {
    /// Remote object path this upload will be written to.
    #[must_use]
    pub fn object_path(&self) -> ResourceId {
        self.target.object_path(&self.kind, &self.mime_type)
    }

    /// FIFO ordering key.
    #[must_use]
    pub fn fifo_key(&self) -> (DateTime<Utc>, u64) {
        (self.enqueued_at, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_string() {
        assert_eq!(UploadKind::from("stage-photo"), UploadKind::StagePhoto);
        let other = UploadKind::from("site-survey");
        assert_eq!(other, UploadKind::Other("site-survey".to_string()));
        assert_eq!(String::from(other), "site-survey");
    }

    #[test]
    fn test_object_path_is_deterministic() {
        let target = TargetRef::new("project_stages", "42", "wiring_photo");
        let a = target.object_path(&UploadKind::StagePhoto, "image/jpeg");
        let b = target.object_path(&UploadKind::StagePhoto, "image/jpeg");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("stage-photo/project_stages/42/wiring_photo-"));
        assert!(a.as_str().ends_with(".jpg"));
    }

    #[test]
    fn test_object_path_sanitizes_segments() {
        let target = TargetRef::new("stages", "../etc", "a b");
        let path = target.object_path(&UploadKind::StagePhoto, "image/png");
        assert!(path.as_str().starts_with("stage-photo/stages/___etc/a_b-"));
        assert!(!path.as_str().contains(".."));
        assert_eq!(path.as_str().matches('/').count(), 3);
    }

    #[test]
    fn test_targets_that_sanitize_alike_get_distinct_paths() {
        let pairs = [
            (TargetRef::new("project_stages", "rec.1", "photo"), TargetRef::new("project_stages", "rec_1", "photo")),
            (TargetRef::new("project_stages", "42", "a b"), TargetRef::new("project_stages", "42", "a_b")),
            (TargetRef::new("a", "bc", "d"), TargetRef::new("ab", "c", "d")),
        ];
        for (a, b) in pairs {
            assert_ne!(
                a.object_path(&UploadKind::StagePhoto, "image/jpeg"),
                b.object_path(&UploadKind::StagePhoto, "image/jpeg"),
                "{a} and {b} share an object"
            );
        }
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&UploadStatus::InFlight).unwrap();
        assert_eq!(json, "\"in-flight\"");
    }

    #[test]
    fn test_upload_id_parse() {
        let id = UploadId::generate();
        assert_eq!(UploadId::parse(&id.to_string()), Some(id));
        assert_eq!(UploadId::parse("nope"), None);
    }
}
