//! Transcode pipeline
//!
//! `process` takes an original byte stream and returns the bytes a spec asks for:
//!
//! 1. Originals that are not image/audio/video pass through untouched.
//! 2. Everything else needs the engine; without one the call fails with `Unavailable`.
//! 3. The source is staged to a seekable file, the engine writes a second one, and
//!    the caller streams the result. The staging area lives as long as the returned
//!    [`TranscodeOutput`] and is removed with it.

use crate::args::{build_arguments, cover_scale_arguments};
use crate::cover::CoverSource;
use crate::engine::TranscodeEngine;
use crate::staging::StagingArea;
use mediacache_core::{MediaError, MediaResult, MimeCategory, RequestSpec};
use mediacache_storage::ByteReader;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

const DEFAULT_COVER_SIZE: u32 = 300;

/// Pipeline result. Reading it yields the artifact; dropping it removes any staged
/// files.
pub struct TranscodeOutput {
    reader: ByteReader,
    len: Option<u64>,
    // Declared after `reader` so the output file is closed before its directory goes.
    _staging: Option<StagingArea>,
}

impl TranscodeOutput {
    fn passthrough(reader: ByteReader) -> Self {
        Self {
            reader,
            len: None,
            _staging: None,
        }
    }

    fn staged(file: tokio::fs::File, len: u64, staging: StagingArea) -> Self {
        Self {
            reader: Box::pin(file),
            len: Some(len),
            _staging: Some(staging),
        }
    }

    /// Size of the engine output. `None` for pass-through, where it is not known upfront.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn is_passthrough(&self) -> bool {
        self._staging.is_none()
    }
}

impl AsyncRead for TranscodeOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

#[derive(Clone)]
pub struct TranscodePipeline {
    engine: Arc<dyn TranscodeEngine>,
    covers: Option<Arc<dyn CoverSource>>,
    cover_size: u32,
}

impl TranscodePipeline {
    pub fn new(engine: Arc<dyn TranscodeEngine>) -> Self {
        Self {
            engine,
            covers: None,
            cover_size: DEFAULT_COVER_SIZE,
        }
    }

    /// Enable `cover` metadata, scaling fetched covers to `size`x`size`.
    pub fn with_covers(mut self, covers: Arc<dyn CoverSource>, size: u32) -> Self {
        self.covers = Some(covers);
        self.cover_size = size.max(1);
        self
    }

    pub fn engine_available(&self) -> bool {
        self.engine.is_available()
    }

    #[tracing::instrument(
        skip(self, spec, source),
        fields(
            base_name = %spec.base_name(),
            original = %spec.original_extension(),
            target = %spec.target_extension()
        )
    )]
    pub async fn process(
        &self,
        spec: &RequestSpec,
        mut source: ByteReader,
    ) -> MediaResult<TranscodeOutput> {
        if !spec.original_category().is_media() {
            tracing::debug!("Original is not media, passing through");
            return Ok(TranscodeOutput::passthrough(source));
        }

        if !self.engine.is_available() {
            return Err(MediaError::Unavailable(
                "FFmpeg is not installed on this server".to_string(),
            ));
        }

        let start = std::time::Instant::now();
        let staging = StagingArea::new()?;

        let input = staging
            .write(&format!("input{}", spec.original_extension()), &mut source)
            .await
            .map_err(|e| e.context("stage original"))?;
        drop(source);

        let output = staging.path(&format!("output{}", spec.target_extension()));

        let cover = match spec.cover_url() {
            Some(url) => self.prepare_cover(spec, &staging, url).await,
            None => None,
        };

        let args = build_arguments(spec, &input, cover.as_deref(), &output);
        self.engine
            .run(&args)
            .await
            .map_err(|e| e.context(&format!("transcode {}", spec.base_name())))?;

        let len = match tokio::fs::metadata(&output).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                return Err(MediaError::EngineFailure {
                    message: format!("engine produced no output: {}", e),
                    stderr: String::new(),
                    args,
                })
            }
        };

        if len == 0 {
            return Err(MediaError::EngineFailure {
                message: "engine produced an empty file".to_string(),
                stderr: String::new(),
                args,
            });
        }

        let file = tokio::fs::File::open(&output).await?;

        tracing::info!(
            size_bytes = len,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transcode completed"
        );

        Ok(TranscodeOutput::staged(file, len, staging))
    }

    /// Fetch and square the cover. Any failure is logged and the cover is skipped.
    async fn prepare_cover(
        &self,
        spec: &RequestSpec,
        staging: &StagingArea,
        url: &str,
    ) -> Option<PathBuf> {
        if spec.target_category() != MimeCategory::Audio {
            tracing::debug!(url = %url, "Cover art only applies to audio outputs, skipping");
            return None;
        }

        let covers = match &self.covers {
            Some(covers) => covers,
            None => {
                tracing::debug!(url = %url, "No cover source configured, skipping cover");
                return None;
            }
        };

        let result: MediaResult<PathBuf> = async {
            let data = covers.fetch(url).await?;
            let downloaded = staging.write_bytes("cover-source", &data).await?;
            let scaled = staging.path("cover.jpg");
            self.engine
                .run(&cover_scale_arguments(&downloaded, self.cover_size, &scaled))
                .await?;
            Ok(scaled)
        }
        .await;

        match result {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Error getting cover art, continuing without it");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;

    /// Copies the first `-i` input to the last argument and records every call.
    #[derive(Default)]
    struct CopyEngine {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
        empty_output: bool,
    }

    impl CopyEngine {
        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscodeEngine for CopyEngine {
        fn is_available(&self) -> bool {
            true
        }

        async fn run(&self, args: &[String]) -> MediaResult<()> {
            self.calls.lock().unwrap().push(args.to_vec());
            if self.fail {
                return Err(MediaError::EngineFailure {
                    message: "exit status 1".to_string(),
                    stderr: "boom".to_string(),
                    args: args.to_vec(),
                });
            }
            let output = args.last().unwrap();
            if self.empty_output {
                tokio::fs::write(output, b"").await?;
            } else {
                tokio::fs::copy(&args[1], output).await?;
            }
            Ok(())
        }
    }

    struct StaticCover;

    #[async_trait]
    impl CoverSource for StaticCover {
        async fn fetch(&self, _url: &str) -> MediaResult<Bytes> {
            Ok(Bytes::from_static(b"jpeg"))
        }
    }

    struct BrokenCover;

    #[async_trait]
    impl CoverSource for BrokenCover {
        async fn fetch(&self, url: &str) -> MediaResult<Bytes> {
            Err(MediaError::Io(format!("connection refused: {}", url)))
        }
    }

    fn source(data: &'static [u8]) -> ByteReader {
        Box::pin(data)
    }

    async fn read_all(mut output: TranscodeOutput) -> Vec<u8> {
        let mut buf = Vec::new();
        output.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn non_media_passes_through_without_engine() {
        let engine = Arc::new(CopyEngine::default());
        let pipeline = TranscodePipeline::new(engine.clone());
        let spec = RequestSpec::builder("doc", ".pdf").build().unwrap();

        let output = pipeline.process(&spec, source(b"%PDF")).await.ok().unwrap();
        assert!(output.is_passthrough());
        assert_eq!(read_all(output).await, b"%PDF");
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn media_without_engine_is_unavailable() {
        let pipeline = TranscodePipeline::new(Arc::new(crate::FfmpegEngine::unavailable()));
        let spec = RequestSpec::builder("photo", ".png").build().unwrap();

        let err = pipeline.process(&spec, source(b"png")).await.err().unwrap();
        assert!(matches!(err, MediaError::Unavailable(_)));
    }

    #[tokio::test]
    async fn transcodes_through_staged_files_and_cleans_up() {
        let engine = Arc::new(CopyEngine::default());
        let pipeline = TranscodePipeline::new(engine.clone());
        let spec = RequestSpec::builder("photo", ".png")
            .target_extension(".webp")
            .dimensions(100, 100)
            .build()
            .unwrap();

        let output = pipeline.process(&spec, source(b"pixels")).await.ok().unwrap();
        assert_eq!(output.len(), Some(6));

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        let args = &calls[0];
        assert!(args[1].ends_with("input.png"));
        assert!(args.last().unwrap().ends_with("output.webp"));
        assert!(args.contains(&"libwebp".to_string()));

        let staged_dir = PathBuf::from(&args[1]).parent().unwrap().to_path_buf();
        assert!(staged_dir.exists());
        assert_eq!(read_all(output).await, b"pixels");
        assert!(!staged_dir.exists());
    }

    #[tokio::test]
    async fn engine_failure_cleans_up() {
        let engine = Arc::new(CopyEngine {
            fail: true,
            ..Default::default()
        });
        let pipeline = TranscodePipeline::new(engine.clone());
        let spec = RequestSpec::builder("song", ".flac")
            .target_extension(".mp3")
            .build()
            .unwrap();

        let err = pipeline.process(&spec, source(b"flac")).await.err().unwrap();
        assert!(matches!(err, MediaError::EngineFailure { .. }));

        let input = PathBuf::from(&engine.calls()[0][1]);
        assert!(!input.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn empty_output_is_an_error() {
        let engine = Arc::new(CopyEngine {
            empty_output: true,
            ..Default::default()
        });
        let pipeline = TranscodePipeline::new(engine);
        let spec = RequestSpec::builder("photo", ".png").build().unwrap();

        let err = pipeline.process(&spec, source(b"png")).await.err().unwrap();
        assert!(matches!(err, MediaError::EngineFailure { .. }));
    }

    #[tokio::test]
    async fn cover_is_scaled_and_attached() {
        let engine = Arc::new(CopyEngine::default());
        let pipeline =
            TranscodePipeline::new(engine.clone()).with_covers(Arc::new(StaticCover), 300);
        let spec = RequestSpec::builder("song", ".flac")
            .target_extension(".mp3")
            .metadata("cover", "https://example.com/cover.jpg")
            .metadata("artist", "Someone")
            .build()
            .unwrap();

        pipeline.process(&spec, source(b"flac")).await.ok().unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].iter().any(|a| a.contains("scale=300:300")));
        let main = &calls[1];
        assert!(main.windows(2).any(|w| w[0] == "-map" && w[1] == "1:v"));
        assert!(main
            .windows(2)
            .any(|w| w[0] == "-metadata" && w[1] == "artist=Someone"));
    }

    #[tokio::test]
    async fn cover_failure_is_skipped() {
        let engine = Arc::new(CopyEngine::default());
        let pipeline =
            TranscodePipeline::new(engine.clone()).with_covers(Arc::new(BrokenCover), 300);
        let spec = RequestSpec::builder("song", ".flac")
            .target_extension(".mp3")
            .metadata("cover", "https://example.com/cover.jpg")
            .build()
            .unwrap();

        pipeline.process(&spec, source(b"flac")).await.ok().unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].contains(&"-map".to_string()));
    }

    #[tokio::test]
    async fn video_source_to_audio_target() {
        let engine = Arc::new(CopyEngine::default());
        let pipeline = TranscodePipeline::new(engine.clone());
        let spec = RequestSpec::builder("clip", ".mov")
            .target_extension(".mp3")
            .build()
            .unwrap();

        pipeline.process(&spec, source(b"moov")).await.ok().unwrap();

        let args = &engine.calls()[0];
        assert!(args[1].ends_with("input.mov"));
        assert!(args.contains(&"libmp3lame".to_string()));
    }
}
