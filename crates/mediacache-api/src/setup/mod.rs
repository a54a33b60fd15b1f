//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::state::AppState;
use anyhow::{Context, Result};
use mediacache_core::Config;
use mediacache_infra::{init_telemetry, LogFormat};
use mediacache_services::MediaServer;
use std::sync::Arc;

/// Initialize telemetry, the storage tiers and the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    init_telemetry(LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    // Fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::info!(
        environment = %config.environment,
        original_backend = %config.original_storage.backend,
        processed_backend = %config.processed_storage.backend,
        "Configuration loaded and validated successfully"
    );

    let media = MediaServer::from_config(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize media server: {}", e))?;

    let state = Arc::new(AppState::new(media));
    let router = routes::setup_routes(state.clone(), config.max_upload_size_bytes);

    Ok((state, router))
}
