use crate::traits::{validate_key, ByteReader, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path` (e.g. "/var/lib/mediacache/original").
    /// The directory is created if it does not exist.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with traversal validation
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or(key: &str, e: std::io::Error, other: fn(String) -> StorageError) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        other(format!("{}: {}", key, e))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn open(&self, key: &str) -> StorageResult<ByteReader> {
        let path = self.key_to_path(key)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or(key, e, StorageError::DownloadFailed))?;

        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or(key, e, StorageError::DownloadFailed))?;

        tracing::debug!(key = %key, size_bytes = metadata.len(), "Local open successful");

        Ok(Box::pin(file))
    }

    async fn create(&self, key: &str, mut reader: ByteReader) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let written = tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.flush().await?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local create successful"
        );

        Ok(written)
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from_path = self.key_to_path(from)?;
        let to_path = self.key_to_path(to)?;
        self.ensure_parent_dir(&to_path).await?;

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| not_found_or(from, e, StorageError::BackendError))?;

        tracing::debug!(from_key = %from, to_key = %to, "Local rename successful");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(key, e, StorageError::DeleteFailed))?;

        tracing::info!(key = %key, "Local remove successful");
        Ok(())
    }

    async fn remove_all(&self, prefix: &str) -> StorageResult<()> {
        let path = self.key_to_path(prefix)?;

        let result = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(&path).await,
            Ok(_) => fs::remove_file(&path).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(prefix = %prefix, "Local remove_all successful");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!("{}: {}", prefix, e))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn dir_exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn reader(data: &'static [u8]) -> ByteReader {
        Box::pin(data)
    }

    async fn read_all(mut reader: ByteReader) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn create_open_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let written = storage
            .create("photo/cached.png.tmp", reader(b"pixels"))
            .await
            .unwrap();
        assert_eq!(written, 6);

        storage
            .rename("photo/cached.png.tmp", "photo/cached.png")
            .await
            .unwrap();

        assert!(!storage.exists("photo/cached.png.tmp").await.unwrap());
        assert!(storage.exists("photo/cached.png").await.unwrap());
        assert!(storage.dir_exists("photo").await.unwrap());
        assert!(!storage.exists("photo").await.unwrap());

        let data = read_all(storage.open("photo/cached.png").await.unwrap()).await;
        assert_eq!(data, b"pixels");
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let err = storage.open("missing").await.err().unwrap();
        assert!(err.is_not_found());

        storage.mkdir("folder").await.unwrap();
        let err = storage.open("folder").await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn remove_all_deletes_directory_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage.create("song/cached_b128.mp3", reader(b"a")).await.unwrap();
        storage.create("song/cached.ogg", reader(b"b")).await.unwrap();

        storage.remove_all("song").await.unwrap();
        assert!(!storage.dir_exists("song").await.unwrap());

        storage.remove_all("song").await.unwrap();
    }

    #[tokio::test]
    async fn remove_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let err = storage.remove("nothing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let err = storage.open("../outside").await.err().unwrap();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
