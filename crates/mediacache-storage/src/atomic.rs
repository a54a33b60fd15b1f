//! Write-then-rename uploads.
//!
//! Readers of `final_key` see either its previous value or the complete new one.
//! This holds as long as the backend's `rename` is atomic with respect to `open`.

use crate::traits::{Storage, StorageResult};
use tokio::io::AsyncRead;
use uuid::Uuid;

const TEMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicUploader;

impl AtomicUploader {
    /// Unique temporary key next to `final_key`, so a rename never crosses directories.
    pub fn temp_key(final_key: &str) -> String {
        format!("{}.{}.{}", final_key, Uuid::new_v4().simple(), TEMP_SUFFIX)
    }

    pub fn is_temp_key(key: &str) -> bool {
        key.ends_with(&format!(".{}", TEMP_SUFFIX))
    }

    /// Stream `reader` into `final_key` via a temporary key. Overwrites `final_key`.
    ///
    /// On failure the temporary key is removed best-effort; a failed removal is
    /// logged and the original error is returned.
    pub async fn put<R>(store: &dyn Storage, final_key: &str, reader: R) -> StorageResult<u64>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let temp_key = Self::temp_key(final_key);
        let start = std::time::Instant::now();

        let result: StorageResult<u64> = async {
            let written = store.create(&temp_key, Box::pin(reader)).await?;
            store.rename(&temp_key, final_key).await?;
            Ok(written)
        }
        .await;

        match result {
            Ok(written) => {
                tracing::info!(
                    key = %final_key,
                    size_bytes = written,
                    backend = %store.backend_type(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Atomic upload completed"
                );
                Ok(written)
            }
            Err(e) => {
                tracing::error!(
                    key = %final_key,
                    temp_key = %temp_key,
                    error = %e,
                    "Atomic upload failed"
                );
                if let Err(cleanup) = store.remove(&temp_key).await {
                    if !cleanup.is_not_found() {
                        tracing::warn!(
                            temp_key = %temp_key,
                            error = %cleanup,
                            "Failed to remove temporary upload"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteReader, MemoryStorage, StorageBackend, StorageError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Yields a few bytes, then fails.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "client went away",
                )))
            } else {
                self.sent = true;
                buf.put_slice(b"partial");
                Poll::Ready(Ok(()))
            }
        }
    }

    /// Accepts writes but refuses every rename.
    struct NoRenameStorage {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl Storage for NoRenameStorage {
        async fn open(&self, key: &str) -> StorageResult<ByteReader> {
            self.inner.open(key).await
        }
        async fn create(&self, key: &str, reader: ByteReader) -> StorageResult<u64> {
            self.inner.create(key, reader).await
        }
        async fn rename(&self, _from: &str, _to: &str) -> StorageResult<()> {
            Err(StorageError::BackendError("rename unsupported".to_string()))
        }
        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key).await
        }
        async fn remove_all(&self, prefix: &str) -> StorageResult<()> {
            self.inner.remove_all(prefix).await
        }
        async fn exists(&self, key: &str) -> StorageResult<bool> {
            self.inner.exists(key).await
        }
        async fn dir_exists(&self, key: &str) -> StorageResult<bool> {
            self.inner.dir_exists(key).await
        }
        async fn mkdir(&self, key: &str) -> StorageResult<()> {
            self.inner.mkdir(key).await
        }
        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Memory
        }
    }

    #[tokio::test]
    async fn put_leaves_only_final_key() {
        let store = MemoryStorage::new();

        let written = AtomicUploader::put(&store, "photo", &b"jpeg bytes"[..])
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert_eq!(store.keys(), vec!["photo".to_string()]);
        assert_eq!(store.get("photo").unwrap(), Bytes::from_static(b"jpeg bytes"));
    }

    #[tokio::test]
    async fn put_overwrites_existing_value() {
        let store = MemoryStorage::new();
        store.insert("photo", "old");

        AtomicUploader::put(&store, "photo", &b"new"[..]).await.unwrap();

        assert_eq!(store.get("photo").unwrap(), Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn failed_stream_keeps_previous_value() {
        let store = MemoryStorage::new();
        store.insert("photo", "old");

        let err = AtomicUploader::put(&store, "photo", BrokenReader { sent: false })
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::UploadFailed(_)));
        assert_eq!(store.keys(), vec!["photo".to_string()]);
        assert_eq!(store.get("photo").unwrap(), Bytes::from_static(b"old"));
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_key() {
        let store = NoRenameStorage {
            inner: MemoryStorage::new(),
        };

        let err = AtomicUploader::put(&store, "photo", &b"data"[..])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::BackendError(_)));
        assert!(store.inner.keys().is_empty());
    }

    #[tokio::test]
    async fn works_on_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::LocalStorage::new(dir.path()).await.unwrap();

        AtomicUploader::put(&store, "photo/cached_w200.webp", &b"webp"[..])
            .await
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("photo"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["cached_w200.webp".to_string()]);
    }

    #[test]
    fn temp_keys_are_unique_and_recognizable() {
        let a = AtomicUploader::temp_key("photo");
        let b = AtomicUploader::temp_key("photo");
        assert_ne!(a, b);
        assert!(a.starts_with("photo."));
        assert!(AtomicUploader::is_temp_key(&a));
        assert!(!AtomicUploader::is_temp_key("photo"));
    }
}
