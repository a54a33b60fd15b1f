//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; any `MediaError` turns
//! into an `HttpAppError` with `?` and renders with a consistent status, body and log
//! line.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mediacache_core::{ErrorMetadata, LogLevel, MediaError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
}

/// Wrapper so `IntoResponse` can be implemented for the core error type.
#[derive(Debug)]
pub struct HttpAppError(pub MediaError);

impl From<MediaError> for HttpAppError {
    fn from(err: MediaError) -> Self {
        HttpAppError(err)
    }
}

fn log_error(error: &MediaError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, code = code, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, code = code, "Request failed");
        }
        LogLevel::Error => {
            if let MediaError::EngineFailure { stderr, args, .. } = error {
                tracing::error!(
                    error = %error,
                    code = code,
                    stderr = %stderr,
                    args = %args.join(" "),
                    "Request failed"
                );
            } else {
                tracing::error!(error = %error, code = code, "Request failed");
            }
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let error = &self.0;

        let status = StatusCode::from_u16(error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(error);

        // Engine stderr and arguments never leave the server.
        let details = if is_production_env() || error.is_sensitive() {
            None
        } else {
            Some(error.to_string())
        };

        let body = Json(ErrorResponse {
            error: error.client_message(),
            details,
            code: error.error_code().to_string(),
            recoverable: error.is_recoverable(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_error_metadata() {
        let response = HttpAppError(MediaError::NotFound("photo".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = HttpAppError(MediaError::Unavailable("no ffmpeg".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = HttpAppError(MediaError::InvalidInput("width".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn engine_failures_are_internal() {
        let response = HttpAppError(MediaError::EngineFailure {
            message: "exit status 1".into(),
            stderr: "secret path".into(),
            args: vec!["-i".into()],
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
