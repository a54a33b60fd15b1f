#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{MemoryStorage, Storage, StorageBackend, StorageError, StorageResult};
use mediacache_core::StorageConfig;
use std::sync::Arc;

/// Create a storage backend for one tier based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3 bucket not configured".to_string()))?;
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;

            let storage = S3Storage::new(bucket, region, config.s3_endpoint.clone())?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_path.clone().ok_or_else(|| {
                StorageError::ConfigError("Local storage path not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;

    fn config(backend: StorageBackend, local_path: Option<String>) -> StorageConfig {
        StorageConfig {
            backend,
            local_path,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
        }
    }

    #[tokio::test]
    async fn creates_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("original").to_string_lossy().to_string();

        let storage = create_storage(&config(StorageBackend::Local, Some(path)))
            .await
            .unwrap();

        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert!(dir.path().join("original").is_dir());
    }

    #[tokio::test]
    async fn local_without_path_is_config_error() {
        let err = create_storage(&config(StorageBackend::Local, None))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }
}
