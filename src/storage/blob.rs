//! Blob Storage
//!
//! Photo bytes live in a blob backend addressed by deterministic keys.
//! Supports both local filesystem and S3 storage backends.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::s3_client::S3Client;
use super::types::StoredBlob;
use crate::error::StorageError;

// ============================================================================
// Blob Storage Trait
// ============================================================================

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Store `data` under `key`, overwriting any existing object
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, StorageError>;

    /// Remove the object at `key`
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Read the object at `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Check whether `key` exists
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

// ============================================================================
// Keys
// ============================================================================

/// Deterministic key for one photo of a batch:
/// `photos/{subject}/{location}/{timestampMillis}-{sequence:03}.{ext}`
pub fn blob_key(
    subject_id: &str,
    location_slug: &str,
    timestamp_millis: i64,
    sequence: u32,
    content_type: &str,
) -> String {
    format!(
        "photos/{}/{}/{}-{:03}.{}",
        urlencoding::encode(subject_id),
        urlencoding::encode(location_slug),
        timestamp_millis,
        sequence,
        extension_for(content_type)
    )
}

/// File extension for an image MIME type
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "bin",
    }
}

/// Compute SHA-256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ============================================================================
// Local Filesystem Storage
// ============================================================================

/// Local filesystem blob storage
pub struct LocalBlobStorage {
    base_path: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StorageError::Local(format!("Invalid blob key: {}", key)));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredBlob, StorageError> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Local(e.to_string()))?;
        }

        let size = data.len() as u64;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::Local(format!("Failed to write blob {}: {}", key, e)))?;

        Ok(StoredBlob {
            key: key.to_string(),
            url: format!("file://{}", path.to_string_lossy()),
            size,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.blob_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Local(format!(
                "Failed to delete blob {}: {}",
                key, e
            ))),
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::ObjectNotFound(key.to_string())
            } else {
                StorageError::Local(format!("Failed to read blob {}: {}", key, e))
            }
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.blob_path(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}

// ============================================================================
// S3 Storage
// ============================================================================

/// S3-based blob storage
pub struct S3BlobStorage {
    client: S3Client,
}

impl S3BlobStorage {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, StorageError> {
        let size = data.len() as u64;
        self.client.put_object(key, data, content_type).await?;

        Ok(StoredBlob {
            key: key.to_string(),
            url: self.client.object_url(key),
            size,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client.delete_object(key).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        Ok(self.client.get_object(key).await?.data)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.client.object_exists(key).await
    }
}

// ============================================================================
// Test Doubles
// ============================================================================

/// Local storage with switchable upload/delete failures
#[cfg(test)]
pub struct FlakyBlobStorage {
    pub inner: LocalBlobStorage,
    /// Uploads succeed this many more times, then fail
    pub uploads_remaining: std::sync::atomic::AtomicI64,
    pub fail_deletes: std::sync::atomic::AtomicBool,
    pub upload_attempts: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FlakyBlobStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            inner: LocalBlobStorage::new(base_path),
            uploads_remaining: std::sync::atomic::AtomicI64::new(i64::MAX),
            fail_deletes: std::sync::atomic::AtomicBool::new(false),
            upload_attempts: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn fail_uploads_after(&self, successes: i64) {
        self.uploads_remaining
            .store(successes, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[async_trait]
impl BlobStorage for FlakyBlobStorage {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, StorageError> {
        use std::sync::atomic::Ordering;

        self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        if self.uploads_remaining.fetch_sub(1, Ordering::SeqCst) <= 0 {
            return Err(StorageError::SdkError("simulated upload failure".to_string()));
        }
        self.inner.upload(key, data, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::SdkError("simulated delete failure".to_string()));
        }
        self.inner.delete(key).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_key_layout() {
        let key = blob_key("TS1", "front-wall", 1_700_000_000_000, 0, "image/jpeg");
        assert_eq!(key, "photos/TS1/front-wall/1700000000000-000.jpg");

        let key = blob_key("TS 1/a", "damage-front-wall", 5, 12, "image/png");
        assert_eq!(key, "photos/TS%201%2Fa/damage-front-wall/5-012.png");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/JPEG"), "jpg");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash(b"Hello, World!");
        assert_eq!(hash.len(), 64); // SHA-256 = 32 bytes = 64 hex chars
        assert_eq!(hash, compute_hash(b"Hello, World!"));
        assert_ne!(hash, compute_hash(b"Hello, World?"));
    }

    #[tokio::test]
    async fn test_local_blob_storage() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalBlobStorage::new(temp_dir.path().to_path_buf());
        let key = "photos/TS1/front-wall/1-000.jpg";

        let stored = storage
            .upload(key, b"jpeg bytes".to_vec(), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(stored.key, key);
        assert_eq!(stored.size, 10);
        assert!(stored.url.starts_with("file://"));

        assert!(storage.exists(key).await.unwrap());
        assert_eq!(storage.get(key).await.unwrap(), b"jpeg bytes");

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await.unwrap());
        assert!(matches!(
            storage.get(key).await,
            Err(StorageError::ObjectNotFound(_))
        ));

        // Deleting again is fine
        storage.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalBlobStorage::new(temp_dir.path().to_path_buf());

        for key in ["../outside.jpg", "/etc/passwd", "photos/../../x", ""] {
            let result = storage.upload(key, vec![1], "image/jpeg").await;
            assert!(matches!(result, Err(StorageError::Local(_))), "{}", key);
        }
    }
}
