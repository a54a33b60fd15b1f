use crate::traits::{validate_key, ByteReader, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::RwLock;
use tokio::io::AsyncReadExt;

/// In-memory storage. Used for tests and for deployments where a tier is disposable.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, Bytes>>,
    dirs: RwLock<BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` directly, bypassing the streaming path.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(key.into(), data.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock_error() -> StorageError {
        StorageError::BackendError("memory storage lock poisoned".to_string())
    }
}

fn is_under(key: &str, prefix: &str) -> bool {
    key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self, key: &str) -> StorageResult<ByteReader> {
        validate_key(key)?;
        let data = self
            .objects
            .read()
            .map_err(|_| Self::lock_error())?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn create(&self, key: &str, mut reader: ByteReader) -> StorageResult<u64> {
        validate_key(key)?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;

        let size = buffer.len() as u64;
        self.objects
            .write()
            .map_err(|_| Self::lock_error())?
            .insert(key.to_string(), Bytes::from(buffer));

        Ok(size)
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        validate_key(from)?;
        validate_key(to)?;
        let mut objects = self.objects.write().map_err(|_| Self::lock_error())?;
        let data = objects
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        objects.insert(to.to_string(), data);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects
            .write()
            .map_err(|_| Self::lock_error())?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn remove_all(&self, prefix: &str) -> StorageResult<()> {
        validate_key(prefix)?;
        self.objects
            .write()
            .map_err(|_| Self::lock_error())?
            .retain(|key, _| !is_under(key, prefix));
        self.dirs
            .write()
            .map_err(|_| Self::lock_error())?
            .retain(|dir| !is_under(dir, prefix));
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self
            .objects
            .read()
            .map_err(|_| Self::lock_error())?
            .contains_key(key))
    }

    async fn dir_exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        if self
            .dirs
            .read()
            .map_err(|_| Self::lock_error())?
            .contains(key)
        {
            return Ok(true);
        }
        Ok(self
            .objects
            .read()
            .map_err(|_| Self::lock_error())?
            .keys()
            .any(|k| k != key && is_under(k, key)))
    }

    async fn mkdir(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.dirs
            .write()
            .map_err(|_| Self::lock_error())?
            .insert(key.to_string());
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_all_respects_segment_boundaries() {
        let storage = MemoryStorage::new();
        storage.insert("photo", "original");
        storage.insert("photo/cached.png", "a");
        storage.insert("photos/cached.png", "b");

        storage.remove_all("photo").await.unwrap();

        assert_eq!(storage.keys(), vec!["photos/cached.png".to_string()]);
    }

    #[tokio::test]
    async fn dir_exists_after_mkdir_or_child_write() {
        let storage = MemoryStorage::new();
        assert!(!storage.dir_exists("photo").await.unwrap());

        storage.mkdir("photo").await.unwrap();
        assert!(storage.dir_exists("photo").await.unwrap());

        storage.insert("song/cached.mp3", "x");
        assert!(storage.dir_exists("song").await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_bytes() {
        let storage = MemoryStorage::new();
        storage.insert("a.tmp", "data");
        storage.rename("a.tmp", "a").await.unwrap();
        assert_eq!(storage.keys(), vec!["a".to_string()]);
        assert_eq!(storage.get("a").unwrap(), Bytes::from_static(b"data"));
    }
}
