//! Tiered media cache orchestration
//!
//! A read walks down the tiers until it finds the artifact and fills every tier it
//! passed on the way back up:
//!
//! ```text
//! working directory -> processed store -> original store + pipeline
//! ```
//!
//! The processed store is written atomically, so a reader sees either no artifact or
//! a complete one. Two concurrent misses for the same key may both transcode; the
//! later rename wins and both results are equivalent.

use bytes::Bytes;
use lru::LruCache;
use mediacache_core::{Config, MediaError, MediaResult, MimeCategory, RequestSpec};
use mediacache_infra::WorkingDirectory;
use mediacache_processing::{
    probe_image_dimensions, read_prefix, FfmpegEngine, TranscodeEngine, TranscodePipeline,
    PROBE_PREFIX_BYTES,
};
use mediacache_storage::{
    create_storage, open_with_backoff, AtomicUploader, ByteReader, RetryPolicy, Storage,
};
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWrite;

/// Originals whose natural dimensions are remembered between requests.
const DIMENSION_CACHE_CAPACITY: usize = 4096;

type DimensionCache = Arc<Mutex<LruCache<String, (u32, u32)>>>;

/// A working file opened for streaming, plus the headers the HTTP layer needs.
#[derive(Debug)]
pub struct ServedFile {
    pub file: tokio::fs::File,
    pub len: u64,
    pub content_type: &'static str,
    pub download_filename: String,
}

#[derive(Clone)]
pub struct MediaServer {
    original: Arc<dyn Storage>,
    processed: Arc<dyn Storage>,
    working: Arc<WorkingDirectory>,
    pipeline: TranscodePipeline,
    retry: RetryPolicy,
    /// Natural dimensions of image originals by base name. Filled on upload and on
    /// the first probe, dropped on delete.
    dimensions: DimensionCache,
}

impl MediaServer {
    pub fn new(
        original: Arc<dyn Storage>,
        processed: Arc<dyn Storage>,
        working: Arc<WorkingDirectory>,
        pipeline: TranscodePipeline,
    ) -> Self {
        Self {
            original,
            processed,
            working,
            pipeline,
            retry: RetryPolicy::default(),
            dimensions: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(DIMENSION_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build every tier from configuration and probe for the engine.
    pub async fn from_config(config: &Config) -> MediaResult<Self> {
        let original = create_storage(&config.original_storage)
            .await
            .map_err(|e| MediaError::from(e).context("original storage"))?;
        let processed = create_storage(&config.processed_storage)
            .await
            .map_err(|e| MediaError::from(e).context("processed storage"))?;
        let working = Arc::new(WorkingDirectory::new(config.working.clone()).await?);

        let engine = FfmpegEngine::detect(config.ffmpeg_path.clone(), config.engine_timeout).await;
        if !engine.is_available() {
            tracing::warn!(
                path = %config.ffmpeg_path,
                "FFmpeg unavailable, only non-media files can be served"
            );
        }

        let pipeline = TranscodePipeline::new(Arc::new(engine));

        #[cfg(feature = "cover-art")]
        let pipeline = pipeline.with_covers(
            Arc::new(mediacache_processing::HttpCoverSource::new()?),
            config.cover_art_size,
        );

        tracing::info!(
            original = %original.backend_type(),
            processed = %processed.backend_type(),
            "Media server ready"
        );

        Ok(Self::new(original, processed, working, pipeline))
    }

    pub fn engine_available(&self) -> bool {
        self.pipeline.engine_available()
    }

    pub fn working(&self) -> &WorkingDirectory {
        &self.working
    }

    /// Write the artifact `spec` describes into `destination`. Returns bytes written.
    ///
    /// With caching disabled the artifact is computed from the original and neither
    /// durable tier nor the working directory is touched.
    #[tracing::instrument(
        skip(self, spec, destination),
        fields(base_name = %spec.base_name(), cache = spec.cache_enabled())
    )]
    pub async fn get<W>(&self, spec: &RequestSpec, destination: &mut W) -> MediaResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let spec = self.resolve_dimensions(spec.clone()).await?;

        if !spec.cache_enabled() {
            let original = self.open_original(&spec).await?;
            let mut output = self.pipeline.process(&spec, original).await?;
            let written = tokio::io::copy(&mut output, destination)
                .await
                .map_err(|e| MediaError::from(e).context("write response"))?;
            return Ok(written);
        }

        let mut file = self.open_working(&spec).await?;
        let written = tokio::io::copy(&mut file, destination)
            .await
            .map_err(|e| MediaError::from(e).context("write response"))?;

        Ok(written)
    }

    /// Guarantee a working file for `spec` and open it for the HTTP layer.
    #[tracing::instrument(skip(self, spec), fields(base_name = %spec.base_name()))]
    pub async fn serve(&self, spec: &RequestSpec) -> MediaResult<ServedFile> {
        let spec = self.resolve_dimensions(spec.clone()).await?;
        let file = self.open_working(&spec).await?;
        let len = file.metadata().await?.len();

        Ok(ServedFile {
            file,
            len,
            content_type: spec.content_type(),
            download_filename: spec.download_filename(),
        })
    }

    /// Store an original under `name`. Returns its dimensions when it is an image.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn put(&self, name: &str, data: Bytes) -> MediaResult<Option<(u32, u32)>> {
        validate_asset_name(name)?;

        let dimensions = probe_image_dimensions(&data);

        AtomicUploader::put(self.original.as_ref(), name, Cursor::new(data))
            .await
            .map_err(|e| MediaError::from(e).context(&format!("store original {}", name)))?;

        match dimensions {
            Some(size) => {
                self.dimensions_cache().put(name.to_string(), size);
            }
            None => {
                self.dimensions_cache().pop(name);
            }
        }

        Ok(dimensions)
    }

    /// Remove an original and everything derived from it.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> MediaResult<()> {
        validate_asset_name(name)?;

        self.original
            .remove(name)
            .await
            .map_err(|e| MediaError::from(e).context(&format!("remove original {}", name)))?;

        self.processed.remove_all(name).await.map_err(|e| {
            MediaError::from(e).context(&format!("remove processed files of {}", name))
        })?;

        self.dimensions_cache().pop(name);

        let purged = self
            .working
            .remove_matching(|entry| RequestSpec::is_working_filename_of(entry, name))
            .await;

        tracing::info!(purged_working = purged, "Deleted media");
        Ok(())
    }

    /// Fill in source dimensions when a single requested dimension needs the
    /// original's aspect ratio. Only the header of the original is read, and only
    /// the first time a base name is seen.
    pub async fn resolve_dimensions(&self, spec: RequestSpec) -> MediaResult<RequestSpec> {
        if !spec.needs_source_dimensions() || spec.original_category() != MimeCategory::Image {
            return Ok(spec);
        }

        let known = self.dimensions_cache().get(spec.base_name()).copied();
        if let Some((width, height)) = known {
            return Ok(spec.with_source_dimensions(width, height));
        }

        let mut original = self.open_original(&spec).await?;
        let prefix = read_prefix(&mut original, PROBE_PREFIX_BYTES)
            .await
            .map_err(|e| MediaError::from(e).context("read original header"))?;

        match probe_image_dimensions(&prefix) {
            Some((width, height)) => {
                tracing::debug!(width = width, height = height, "Resolved source dimensions");
                self.dimensions_cache()
                    .put(spec.base_name().to_string(), (width, height));
                Ok(spec.with_source_dimensions(width, height))
            }
            None => {
                tracing::debug!(
                    base_name = %spec.base_name(),
                    "Could not read source dimensions, keeping aspect in the engine"
                );
                Ok(spec)
            }
        }
    }

    /// Make sure the processed store holds the artifact for `spec`.
    pub async fn ensure_processed_file(&self, spec: &RequestSpec) -> MediaResult<()> {
        let key = spec.processed_path();

        if self.processed.exists(&key).await? {
            tracing::trace!(key = %key, "Processed file found");
            return Ok(());
        }

        let dir = spec.processed_dir();
        if !self.processed.dir_exists(dir).await? {
            tracing::trace!(dir = %dir, "Creating processed folder");
            self.processed
                .mkdir(dir)
                .await
                .map_err(|e| MediaError::from(e).context("create processed folder"))?;
        }

        let start = std::time::Instant::now();
        let original = self.open_original(spec).await?;
        let output = self.pipeline.process(spec, original).await?;

        AtomicUploader::put(self.processed.as_ref(), &key, output)
            .await
            .map_err(|e| MediaError::from(e).context(&format!("store processed {}", key)))?;

        tracing::info!(
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Created processed file"
        );

        Ok(())
    }

    /// Make sure the working directory holds the artifact for `spec`.
    pub async fn ensure_working_file(&self, spec: &RequestSpec) -> MediaResult<()> {
        let name = spec.working_filename();

        if self.working.exists(&name).await? {
            return Ok(());
        }

        self.ensure_processed_file(spec).await?;

        let key = spec.processed_path();
        let mut processed = open_with_backoff(self.processed.as_ref(), &key, self.retry)
            .await
            .map_err(|e| MediaError::from(e).context("open processed file"))?;

        let written = self.working.write(&name, &mut processed).await?;
        if written == 0 {
            // Never serve an empty artifact; drop it so the next request rebuilds it.
            self.working.remove(&name).await?;
            if let Err(e) = self.processed.remove(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to remove empty processed file");
            }
            return Err(MediaError::NotFound(format!("Processed file is empty: {}", key)));
        }

        Ok(())
    }

    /// Close the working directory. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.working.close().await;
    }

    fn dimensions_cache(&self) -> std::sync::MutexGuard<'_, LruCache<String, (u32, u32)>> {
        self.dimensions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn open_original(&self, spec: &RequestSpec) -> MediaResult<ByteReader> {
        open_with_backoff(self.original.as_ref(), spec.base_name(), self.retry)
            .await
            .map_err(|e| MediaError::from(e).context("open original"))
    }

    /// Open the working file, rebuilding it once if it was evicted between the
    /// existence check and the open.
    async fn open_working(&self, spec: &RequestSpec) -> MediaResult<tokio::fs::File> {
        let name = spec.working_filename();

        self.ensure_working_file(spec).await?;
        match self.working.open(&name).await {
            Ok(file) => Ok(file),
            Err(e) if e.is_not_found() => {
                tracing::debug!(name = %name, "Working file evicted before open, rebuilding");
                self.ensure_working_file(spec).await?;
                self.working.open(&name).await
            }
            Err(e) => Err(e),
        }
    }
}

fn validate_asset_name(name: &str) -> MediaResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(MediaError::InvalidInput(format!("Invalid asset name: {}", name)));
    }
    Ok(())
}
