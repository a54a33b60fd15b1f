//! Storage abstraction trait
//!
//! This module defines the Storage trait that all durable tiers implement.

use crate::StorageBackend;
use async_trait::async_trait;
use mediacache_core::MediaError;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// True for a missing key, including a missing file surfaced as an IO error.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::IoError(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<StorageError> for MediaError {
    fn from(err: StorageError) -> Self {
        match err {
            e if e.is_not_found() => MediaError::NotFound(e.to_string()),
            StorageError::InvalidKey(key) => MediaError::InvalidInput(key),
            StorageError::ConfigError(msg) => MediaError::Internal(msg),
            other => MediaError::Io(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming reader returned by [`Storage::open`].
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Storage abstraction trait
///
/// Backends (local filesystem, S3, memory) implement this trait so the cache tiers can
/// run against any of them. A backend is not required to be read-after-write
/// consistent; callers that need to read a key they just wrote go through
/// [`crate::open_with_backoff`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a key for streaming reads. Missing keys fail with `NotFound`.
    async fn open(&self, key: &str) -> StorageResult<ByteReader>;

    /// Write the whole stream to `key`, replacing any existing value.
    /// Returns the number of bytes written.
    async fn create(&self, key: &str, reader: ByteReader) -> StorageResult<u64>;

    /// Move `from` to `to`, replacing `to` if it exists.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Remove a single key. Missing keys fail with `NotFound`.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Remove `prefix` and everything below `prefix/`. Missing prefixes are not an error.
    async fn remove_all(&self, prefix: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn dir_exists(&self, key: &str) -> StorageResult<bool>;

    /// Ensure a directory exists. A no-op on stores without directories.
    async fn mkdir(&self, key: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Rejects keys that could escape the store root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|segment| segment == ".." || segment == ".")
    {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(validate_key("photo").is_ok());
        assert!(validate_key("photo/cached_w200.webp").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("photo/../../etc").is_err());
    }

    #[test]
    fn not_found_converts_to_media_not_found() {
        let err: MediaError = StorageError::NotFound("photo".to_string()).into();
        assert!(err.is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: MediaError = StorageError::IoError(io).into();
        assert!(err.is_not_found());

        let err: MediaError = StorageError::UploadFailed("disk full".to_string()).into();
        assert!(matches!(err, MediaError::Io(_)));
    }
}
