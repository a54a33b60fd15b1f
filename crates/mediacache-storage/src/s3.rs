use crate::traits::{validate_key, ByteReader, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectMeta, ObjectStore, ObjectStoreExt, PutPayload, Result as ObjectResult};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

/// S3 storage implementation
///
/// Object stores have no directories, so `mkdir` is a no-op and `dir_exists` reports
/// whether any object lives under the prefix. `rename` is copy-then-delete; readers
/// see either the old value or the complete new one.
#[derive(Clone, Debug)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectMeta>> {
        let location = Path::from(prefix.to_string());
        self.store
            .list(Some(&location))
            .try_collect()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))
    }

    async fn delete_location(&self, location: &Path) -> StorageResult<()> {
        let result: ObjectResult<_> = self.store.delete(location).await;
        match result {
            Ok(()) => Ok(()),
            Err(ObjectStoreError::NotFound { .. }) => {
                Err(StorageError::NotFound(location.to_string()))
            }
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn open(&self, key: &str) -> StorageResult<ByteReader> {
        validate_key(key)?;
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 open failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bucket = self.bucket.clone();
        let stream_key = key.to_string();
        let stream = result.into_stream().map(move |res| {
            res.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %stream_key,
                    "S3 stream download error"
                );
                std::io::Error::other(e)
            })
        });

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 open successful"
        );

        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn create(&self, key: &str, mut reader: ByteReader) -> StorageResult<u64> {
        validate_key(key)?;
        let start = std::time::Instant::now();

        // Buffered into a single put; processed artifacts and uploads are bounded by the
        // request body limit.
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;

        let size = buffer.len() as u64;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self
            .store
            .put(&location, PutPayload::from(Bytes::from(buffer)))
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 create failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 create successful"
        );

        Ok(size)
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        validate_key(from)?;
        validate_key(to)?;
        let start = std::time::Instant::now();
        let from_location = Path::from(from.to_string());
        let to_location = Path::from(to.to_string());

        let copy_result: ObjectResult<_> = self.store.copy(&from_location, &to_location).await;

        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(from.to_string()),
            other => StorageError::BackendError(other.to_string()),
        })?;

        self.delete_location(&from_location).await?;

        tracing::info!(
            from_key = %from,
            to_key = %to,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 rename successful"
        );

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        self.delete_location(&location).await.inspect_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 remove failed"
            );
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 remove successful"
        );

        Ok(())
    }

    async fn remove_all(&self, prefix: &str) -> StorageResult<()> {
        validate_key(prefix)?;
        let objects = self.list(prefix).await?;
        let count = objects.len();

        for object in objects {
            match self.delete_location(&object.location).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        // The prefix itself may also be an object.
        match self.delete_location(&Path::from(prefix.to_string())).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        tracing::info!(
            bucket = %self.bucket,
            prefix = %prefix,
            objects = count,
            "S3 remove_all successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn dir_exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let location = Path::from(key.to_string());
        let first = self.store.list(Some(&location)).next().await;
        match first {
            Some(Ok(_)) => Ok(true),
            None => Ok(false),
            Some(Err(e)) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn mkdir(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        tracing::trace!(key = %key, "S3 has no directories, mkdir skipped");
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
