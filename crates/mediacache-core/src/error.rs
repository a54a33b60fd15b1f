//! Error types module
//!
//! All failures surfaced by the cache tiers are unified under `MediaError`. Cleanup
//! failures (temporary files, evicted working files, abandoned uploads) are logged at
//! the point they happen and never become a `MediaError`.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like a missing asset
    Debug,
    /// Warning level - for recoverable issues like a missing engine
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "ENGINE_FAILURE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Source or cached artifact absent (after retries, where they apply).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The transformation engine is not installed or not runnable.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// The engine ran and failed. `stderr` and `args` are for operators only.
    #[error("Engine failure: {message}")]
    EngineFailure {
        message: String,
        stderr: String,
        args: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(String),

    /// Misconfiguration or a broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Prefixes the message with the operation that failed, keeping the variant.
    pub fn context(self, operation: &str) -> Self {
        match self {
            MediaError::NotFound(m) => MediaError::NotFound(format!("{}: {}", operation, m)),
            MediaError::Unavailable(m) => MediaError::Unavailable(format!("{}: {}", operation, m)),
            MediaError::EngineFailure {
                message,
                stderr,
                args,
            } => MediaError::EngineFailure {
                message: format!("{}: {}", operation, message),
                stderr,
                args,
            },
            MediaError::Io(m) => MediaError::Io(format!("{}: {}", operation, m)),
            MediaError::Internal(m) => MediaError::Internal(format!("{}: {}", operation, m)),
            MediaError::InvalidInput(m) => {
                MediaError::InvalidInput(format!("{}: {}", operation, m))
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MediaError::NotFound(_))
    }
}

impl From<io::Error> for MediaError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            MediaError::NotFound(err.to_string())
        } else {
            MediaError::Io(err.to_string())
        }
    }
}

impl From<anyhow::Error> for MediaError {
    fn from(err: anyhow::Error) -> Self {
        MediaError::Internal(format!("{:#}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, sensitive, log_level).
fn media_error_static_metadata(err: &MediaError) -> (u16, &'static str, bool, bool, LogLevel) {
    match err {
        MediaError::NotFound(_) => (404, "NOT_FOUND", false, false, LogLevel::Debug),
        MediaError::Unavailable(_) => (503, "ENGINE_UNAVAILABLE", true, false, LogLevel::Warn),
        MediaError::EngineFailure { .. } => (500, "ENGINE_FAILURE", false, true, LogLevel::Error),
        MediaError::Io(_) => (500, "IO_ERROR", true, true, LogLevel::Error),
        MediaError::Internal(_) => (500, "INTERNAL_ERROR", false, true, LogLevel::Error),
        MediaError::InvalidInput(_) => (400, "INVALID_INPUT", false, false, LogLevel::Debug),
    }
}

impl ErrorMetadata for MediaError {
    fn http_status_code(&self) -> u16 {
        media_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        media_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        media_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            MediaError::NotFound(_) => "The requested file was not found".to_string(),
            MediaError::Unavailable(_) => {
                "Media processing is not available on this server".to_string()
            }
            MediaError::EngineFailure { .. } => "Media processing failed".to_string(),
            MediaError::Io(_) | MediaError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            MediaError::InvalidInput(msg) => msg.clone(),
        }
    }

    fn is_sensitive(&self) -> bool {
        media_error_static_metadata(self).3
    }

    fn log_level(&self) -> LogLevel {
        media_error_static_metadata(self).4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_hides_diagnostics() {
        let err = MediaError::EngineFailure {
            message: "ffmpeg exited with status 1".to_string(),
            stderr: "Invalid data found when processing input".to_string(),
            args: vec!["-i".to_string(), "/tmp/in.heic".to_string()],
        };

        assert!(err.is_sensitive());
        assert_eq!(err.http_status_code(), 500);
        assert!(!err.client_message().contains("Invalid data"));
        assert!(!err.to_string().contains("/tmp/in.heic"));
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err: MediaError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_not_found());
        assert_eq!(err.http_status_code(), 404);
    }

    #[test]
    fn context_keeps_variant() {
        let err = MediaError::Unavailable("ffmpeg missing".to_string()).context("process photo");
        assert_eq!(err.error_code(), "ENGINE_UNAVAILABLE");
        assert_eq!(err.to_string(), "Unavailable: process photo: ffmpeg missing");
    }
}
