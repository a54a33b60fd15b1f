//! Route configuration

use crate::handlers;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn setup_routes(state: Arc<AppState>, max_upload_size_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/media/{file}",
            get(handlers::media_get::get_media)
                .put(handlers::media_upload::put_media)
                .delete(handlers::media_delete::delete_media),
        )
        .with_state(state)
        // Uploads are bounded by RequestBodyLimitLayer instead of axum's 2 MB default.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_size_bytes))
        .layer(TraceLayer::new_for_http())
}
