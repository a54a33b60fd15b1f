use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Store the raw request body as the original of `file`. Any extension in the path is
/// dropped: originals are addressed by bare name.
pub async fn put_media(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let name = super::asset_name(&file);
    let size = body.len();

    let dimensions = state.media.put(name, body).await?;

    tracing::info!(
        name = %name,
        size_bytes = size,
        dimensions = ?dimensions,
        "Media stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            name: name.to_string(),
            width: dimensions.map(|(width, _)| width),
            height: dimensions.map(|(_, height)| height),
        }),
    ))
}
