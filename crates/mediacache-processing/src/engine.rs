//! External transformation engine.

use async_trait::async_trait;
use mediacache_core::{MediaError, MediaResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A subprocess-backed transcoder. Injected into the pipeline so tests can swap in a
/// fake and deployments without the binary fail with `Unavailable`.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    fn is_available(&self) -> bool;

    /// Run the engine to completion with `args`. A non-zero exit is an `EngineFailure`
    /// carrying stderr and the arguments.
    async fn run(&self, args: &[String]) -> MediaResult<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg_path: String,
    available: bool,
    timeout: Option<Duration>,
}

impl FfmpegEngine {
    /// Probes `ffmpeg_path -version` once. The result is fixed for the engine's lifetime.
    pub async fn detect(ffmpeg_path: impl Into<String>, timeout: Option<Duration>) -> Self {
        let ffmpeg_path = ffmpeg_path.into();

        let available = match Command::new(&ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::warn!(path = %ffmpeg_path, error = %e, "FFmpeg not found");
                false
            }
        };

        if available {
            tracing::info!(path = %ffmpeg_path, "FFmpeg detected");
        }

        Self {
            ffmpeg_path,
            available,
            timeout,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            available: false,
            timeout: None,
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn run(&self, args: &[String]) -> MediaResult<()> {
        if !self.available {
            return Err(MediaError::Unavailable(
                "FFmpeg is not installed on this server".to_string(),
            ));
        }

        tracing::debug!(command = %format!("{} {}", self.ffmpeg_path, args.join(" ")), "Executing engine");
        let start = std::time::Instant::now();

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command.output();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(MediaError::EngineFailure {
                        message: format!("FFmpeg timed out after {}s", limit.as_secs()),
                        stderr: String::new(),
                        args: args.to_vec(),
                    });
                }
            },
            None => child.await,
        }
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                MediaError::Unavailable(format!("Failed to execute ffmpeg: {}", e))
            }
            _ => MediaError::Io(format!("Failed to execute ffmpeg: {}", e)),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::error!(
                status = %output.status,
                stderr = %stderr,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "FFmpeg failed"
            );
            return Err(MediaError::EngineFailure {
                message: format!("FFmpeg exited with {}", output.status),
                stderr,
                args: args.to_vec(),
            });
        }

        tracing::debug!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "FFmpeg finished"
        );

        Ok(())
    }
}
