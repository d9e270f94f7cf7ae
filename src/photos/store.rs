//! Photo Store
//!
//! Persists captured photos so that every (subject, location) pair has at
//! most one live batch. Replacement is delete-then-insert: old blobs and
//! index entries are removed before the new blobs are uploaded, so a failed
//! write leaves the location empty rather than half-replaced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::location::{InvalidLocationLabel, PhotoLocation};
use crate::db::{PhotoRepository, PhotoRow};
use crate::error::StorageError;
use crate::recognition::ColorLabel;
use crate::storage::{blob_key, compute_hash, BlobStorage};

/// Longest accepted subject identifier
const MAX_SUBJECT_LEN: usize = 128;

// ============================================================================
// Types
// ============================================================================

/// Photo bytes as submitted
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl PhotoUpload {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

/// Operator-confirmed identifiers stored with a photo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorLabel>,
}

/// A stored photo
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub subject_id: String,
    pub location: PhotoLocation,
    pub batch_id: String,
    pub sequence: u32,
    pub blob_key: String,
    pub url: String,
    pub byte_size: u64,
    pub content_type: String,
    pub content_hash: String,
    pub metadata: PhotoMetadata,
    pub created_at: DateTime<Utc>,
}

impl PhotoRecord {
    fn into_row(self) -> Result<PhotoRow, PhotoStoreError> {
        let metadata = serde_json::to_string(&self.metadata)
            .map_err(|e| PhotoStoreError::Index(sqlx::Error::Decode(Box::new(e))))?;

        Ok(PhotoRow {
            id: self.id,
            subject_id: self.subject_id,
            location: self.location.label(),
            batch_id: self.batch_id,
            sequence: self.sequence as i64,
            blob_key: self.blob_key,
            url: self.url,
            byte_size: self.byte_size as i64,
            content_type: self.content_type,
            content_hash: self.content_hash,
            metadata,
            created_at: self.created_at.to_rfc3339(),
        })
    }
}

impl TryFrom<PhotoRow> for PhotoRecord {
    type Error = PhotoStoreError;

    fn try_from(row: PhotoRow) -> Result<Self, Self::Error> {
        let decode = |e: Box<dyn std::error::Error + Send + Sync>| {
            PhotoStoreError::Index(sqlx::Error::Decode(e))
        };

        let location = PhotoLocation::parse(&row.location).map_err(|e| decode(Box::new(e)))?;
        let metadata: PhotoMetadata =
            serde_json::from_str(&row.metadata).map_err(|e| decode(Box::new(e)))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| decode(Box::new(e)))?
            .with_timezone(&Utc);

        Ok(PhotoRecord {
            id: row.id,
            subject_id: row.subject_id,
            location,
            batch_id: row.batch_id,
            sequence: row.sequence.max(0) as u32,
            blob_key: row.blob_key,
            url: row.url,
            byte_size: row.byte_size.max(0) as u64,
            content_type: row.content_type,
            content_hash: row.content_hash,
            metadata,
            created_at,
        })
    }
}

/// Observable state of one (subject, location) slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Empty,
    Writing,
    Present,
    Replacing,
}

/// Result of a successful put
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutOutcome {
    /// The location's new batch
    pub records: Vec<PhotoRecord>,
    /// Index entries removed before the write
    pub replaced: usize,
    /// Blob keys whose delete failed; no longer indexed
    pub orphaned_blobs: Vec<String>,
}

/// Photo store errors
#[derive(Debug, thiserror::Error)]
pub enum PhotoStoreError {
    #[error("Invalid location label: {0}")]
    InvalidLocationLabel(String),

    #[error("Invalid subject id: {0:?}")]
    InvalidSubject(String),

    #[error("No photos submitted")]
    EmptyBatch,

    #[error("Location {location} holds a single photo, got {count}")]
    SingletonBatch { location: String, count: usize },

    #[error("Photo write failed: {0}")]
    WriteFailure(String),

    #[error("Photo index error: {0}")]
    Index(#[from] sqlx::Error),

    #[error("Blob error: {0}")]
    Blob(#[from] StorageError),
}

impl PhotoStoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PhotoStoreError::InvalidLocationLabel(_) | PhotoStoreError::InvalidSubject(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PhotoStoreError::EmptyBatch | PhotoStoreError::SingletonBatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            PhotoStoreError::WriteFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            PhotoStoreError::Blob(StorageError::ObjectNotFound(_)) => StatusCode::NOT_FOUND,
            PhotoStoreError::Index(_) | PhotoStoreError::Blob(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PhotoStoreError::InvalidLocationLabel(_) => "invalid_location_label",
            PhotoStoreError::InvalidSubject(_) => "invalid_subject",
            PhotoStoreError::EmptyBatch => "empty_batch",
            PhotoStoreError::SingletonBatch { .. } => "singleton_batch",
            PhotoStoreError::WriteFailure(_) => "photo_store_write_failure",
            PhotoStoreError::Index(_) => "photo_index_error",
            PhotoStoreError::Blob(StorageError::ObjectNotFound(_)) => "not_found",
            PhotoStoreError::Blob(_) => "storage_error",
        }
    }

    /// Whether the operator should be prompted to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, PhotoStoreError::WriteFailure(_))
    }
}

impl From<InvalidLocationLabel> for PhotoStoreError {
    fn from(err: InvalidLocationLabel) -> Self {
        PhotoStoreError::InvalidLocationLabel(err.0)
    }
}

// ============================================================================
// Photo Store
// ============================================================================

type SlotKey = (String, String);

/// Idempotent photo store over a blob backend and the SQLite index
#[derive(Clone)]
pub struct PhotoStore {
    inner: Arc<PhotoStoreInner>,
}

struct PhotoStoreInner {
    blobs: Arc<dyn BlobStorage>,
    pool: SqlitePool,
    /// Per-slot write locks
    locks: Mutex<HashMap<SlotKey, Arc<tokio::sync::Mutex<()>>>>,
    /// Slots with a write in flight
    phases: Mutex<HashMap<SlotKey, SlotState>>,
    /// Last timestamp handed to a blob key
    last_timestamp: AtomicI64,
}

/// Clears a slot's in-flight phase when the write ends, however it ends
struct PhaseGuard {
    inner: Arc<PhotoStoreInner>,
    key: SlotKey,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.inner.phases.lock().remove(&self.key);
    }
}

impl PhotoStore {
    pub fn new(blobs: Arc<dyn BlobStorage>, pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(PhotoStoreInner {
                blobs,
                pool,
                locks: Mutex::new(HashMap::new()),
                phases: Mutex::new(HashMap::new()),
                last_timestamp: AtomicI64::new(0),
            }),
        }
    }

    /// Store the single photo of a location, replacing whatever was there
    pub async fn put(
        &self,
        subject_id: &str,
        location: &str,
        upload: PhotoUpload,
        metadata: PhotoMetadata,
    ) -> Result<PutOutcome, PhotoStoreError> {
        self.put_batch(subject_id, location, vec![upload], metadata)
            .await
    }

    /// Replace a location's batch with `uploads`.
    ///
    /// Singleton locations accept exactly one photo. Existing blobs and index
    /// entries are removed before any upload starts; if an upload or the
    /// index insert fails the location is left empty.
    pub async fn put_batch(
        &self,
        subject_id: &str,
        location: &str,
        uploads: Vec<PhotoUpload>,
        metadata: PhotoMetadata,
    ) -> Result<PutOutcome, PhotoStoreError> {
        let subject_id = validate_subject(subject_id)?;
        let location = PhotoLocation::parse(location)?;

        if uploads.is_empty() {
            return Err(PhotoStoreError::EmptyBatch);
        }
        if !location.is_set() && uploads.len() != 1 {
            return Err(PhotoStoreError::SingletonBatch {
                location: location.label(),
                count: uploads.len(),
            });
        }

        let key: SlotKey = (subject_id.to_string(), location.label());
        let slot_lock = {
            let mut locks = self.inner.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        let _slot = slot_lock.lock_owned().await;

        let repo = PhotoRepository::new(&self.inner.pool);
        let label = location.label();

        // 1. Look up the current batch
        let existing = repo.list_for_location(subject_id, &label).await?;

        let _phase = self.enter_phase(
            key,
            if existing.is_empty() {
                SlotState::Writing
            } else {
                SlotState::Replacing
            },
        );

        // 2. Delete old blobs, best-effort
        let mut orphaned_blobs = Vec::new();
        for row in &existing {
            if let Err(e) = self.inner.blobs.delete(&row.blob_key).await {
                tracing::warn!(
                    subject_id = %subject_id,
                    location = %label,
                    blob_key = %row.blob_key,
                    "Orphaned blob, delete failed: {}",
                    e
                );
                orphaned_blobs.push(row.blob_key.clone());
            }
        }

        // 3. Remove old index entries
        let replaced = match repo.delete_for_location(subject_id, &label).await {
            Ok(count) => count as usize,
            Err(e) => {
                tracing::error!(
                    subject_id = %subject_id,
                    location = %label,
                    "Photo index delete failed: {}",
                    e
                );
                return Err(PhotoStoreError::WriteFailure(e.to_string()));
            }
        };

        // 4. Upload new blobs
        let batch_id = Uuid::new_v4().to_string();
        let timestamp = self.next_timestamp();
        let created_at = Utc::now();
        let mut records: Vec<PhotoRecord> = Vec::with_capacity(uploads.len());

        for (sequence, upload) in uploads.into_iter().enumerate() {
            let sequence = sequence as u32;
            let key = blob_key(
                subject_id,
                &location.slug(),
                timestamp,
                sequence,
                &upload.content_type,
            );
            let content_hash = compute_hash(&upload.bytes);

            match self
                .inner
                .blobs
                .upload(&key, upload.bytes, &upload.content_type)
                .await
            {
                Ok(stored) => records.push(PhotoRecord {
                    id: Uuid::new_v4().to_string(),
                    subject_id: subject_id.to_string(),
                    location,
                    batch_id: batch_id.clone(),
                    sequence,
                    blob_key: stored.key,
                    url: stored.url,
                    byte_size: stored.size,
                    content_type: upload.content_type,
                    content_hash,
                    metadata: metadata.clone(),
                    created_at,
                }),
                Err(e) => {
                    tracing::error!(
                        subject_id = %subject_id,
                        location = %label,
                        blob_key = %key,
                        backend = self.inner.blobs.backend(),
                        "Photo upload failed: {}",
                        e
                    );
                    self.discard_uploaded(&records).await;
                    return Err(PhotoStoreError::WriteFailure(e.to_string()));
                }
            }
        }

        // 5. Insert the new index entries
        let rows = records
            .iter()
            .cloned()
            .map(PhotoRecord::into_row)
            .collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = repo.insert_batch(&rows).await {
            tracing::error!(
                subject_id = %subject_id,
                location = %label,
                "Photo index insert failed: {}",
                e
            );
            self.discard_uploaded(&records).await;
            return Err(PhotoStoreError::WriteFailure(e.to_string()));
        }

        tracing::info!(
            subject_id = %subject_id,
            location = %label,
            photos = records.len(),
            replaced,
            orphaned = orphaned_blobs.len(),
            "Stored photos"
        );

        Ok(PutOutcome {
            records,
            replaced,
            orphaned_blobs,
        })
    }

    /// Current state of a slot
    pub async fn slot_state(
        &self,
        subject_id: &str,
        location: &str,
    ) -> Result<SlotState, PhotoStoreError> {
        let subject_id = subject_id.trim();
        let location = PhotoLocation::parse(location)?;
        let key: SlotKey = (subject_id.to_string(), location.label());

        if let Some(phase) = self.inner.phases.lock().get(&key).copied() {
            return Ok(phase);
        }

        let count = PhotoRepository::new(&self.inner.pool)
            .count_for_location(subject_id, &location.label())
            .await?;

        Ok(if count > 0 {
            SlotState::Present
        } else {
            SlotState::Empty
        })
    }

    /// Every photo of a subject
    pub async fn list(&self, subject_id: &str) -> Result<Vec<PhotoRecord>, PhotoStoreError> {
        PhotoRepository::new(&self.inner.pool)
            .list_for_subject(subject_id.trim())
            .await?
            .into_iter()
            .map(PhotoRecord::try_from)
            .collect()
    }

    /// The current batch at a location
    pub async fn list_location(
        &self,
        subject_id: &str,
        location: &str,
    ) -> Result<Vec<PhotoRecord>, PhotoStoreError> {
        let location = PhotoLocation::parse(location)?;
        PhotoRepository::new(&self.inner.pool)
            .list_for_location(subject_id.trim(), &location.label())
            .await?
            .into_iter()
            .map(PhotoRecord::try_from)
            .collect()
    }

    /// One photo of a location's batch
    pub async fn find(
        &self,
        subject_id: &str,
        location: &str,
        sequence: u32,
    ) -> Result<Option<PhotoRecord>, PhotoStoreError> {
        let location = PhotoLocation::parse(location)?;
        PhotoRepository::new(&self.inner.pool)
            .get(subject_id.trim(), &location.label(), sequence as i64)
            .await?
            .map(PhotoRecord::try_from)
            .transpose()
    }

    /// Read a stored photo's bytes
    pub async fn fetch_blob(&self, record: &PhotoRecord) -> Result<Vec<u8>, PhotoStoreError> {
        Ok(self.inner.blobs.get(&record.blob_key).await?)
    }

    fn enter_phase(&self, key: SlotKey, phase: SlotState) -> PhaseGuard {
        self.inner.phases.lock().insert(key.clone(), phase);
        PhaseGuard {
            inner: self.inner.clone(),
            key,
        }
    }

    /// Strictly increasing millisecond timestamp so keys never collide
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .inner
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    async fn discard_uploaded(&self, records: &[PhotoRecord]) {
        for record in records {
            if let Err(e) = self.inner.blobs.delete(&record.blob_key).await {
                tracing::warn!(
                    blob_key = %record.blob_key,
                    "Orphaned blob from failed batch: {}",
                    e
                );
            }
        }
    }
}

fn validate_subject(subject_id: &str) -> Result<&str, PhotoStoreError> {
    let trimmed = subject_id.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_SUBJECT_LEN
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.chars().any(|c| c.is_control());

    if valid {
        Ok(trimmed)
    } else {
        Err(PhotoStoreError::InvalidSubject(subject_id.to_string()))
    }
}
