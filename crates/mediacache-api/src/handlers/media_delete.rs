use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

/// Remove an original together with every cached rendition.
pub async fn delete_media(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> Result<StatusCode, HttpAppError> {
    let name = super::asset_name(&file);
    state.media.delete(name).await?;

    tracing::info!(name = %name, "Media deleted");
    Ok(StatusCode::NO_CONTENT)
}
