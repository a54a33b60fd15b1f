//! Configuration module
//!
//! Settings are read from the environment (and an optional `.env` file) once at
//! startup. Unparseable numeric values fall back to their defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 8080;
const WORKING_TTL_SECS: u64 = 600;
const WORKING_CAPACITY: usize = 1000;
const WORKING_SWEEP_INTERVAL_SECS: u64 = 30;
const COVER_ART_SIZE: u32 = 300;
const MAX_UPLOAD_SIZE_MB: usize = 512;

/// One durable tier (original or processed).
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
}

impl StorageConfig {
    /// Reads `{PREFIX}_STORAGE_BACKEND`, `{PREFIX}_STORAGE_PATH` and
    /// `{PREFIX}_S3_BUCKET`. Region and endpoint are shared between tiers.
    fn from_env(prefix: &str) -> Result<Self, anyhow::Error> {
        let backend = env::var(format!("{}_STORAGE_BACKEND", prefix))
            .unwrap_or_else(|_| "local".to_string())
            .parse()?;

        Ok(StorageConfig {
            backend,
            local_path: env::var(format!("{}_STORAGE_PATH", prefix)).ok(),
            s3_bucket: env::var(format!("{}_S3_BUCKET", prefix)).ok(),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
        })
    }

    fn validate(&self, prefix: &str) -> Result<(), anyhow::Error> {
        match self.backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "{}_S3_BUCKET must be set when using S3 storage backend",
                        prefix
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "{}_STORAGE_PATH must be set when using local storage backend",
                        prefix
                    ));
                }
            }
            StorageBackend::Memory => {}
        }
        Ok(())
    }
}

/// Settings for the local working directory cache.
#[derive(Clone, Debug)]
pub struct WorkingDirConfig {
    pub folder: PathBuf,
    pub ttl: Duration,
    pub capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for WorkingDirConfig {
    fn default() -> Self {
        Self {
            folder: env::temp_dir().join("mediacache-working"),
            ttl: Duration::from_secs(WORKING_TTL_SECS),
            capacity: WORKING_CAPACITY,
            sweep_interval: Duration::from_secs(WORKING_SWEEP_INTERVAL_SECS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub original_storage: StorageConfig,
    pub processed_storage: StorageConfig,
    pub working: WorkingDirConfig,
    pub ffmpeg_path: String,
    /// `None` lets the engine run as long as it needs.
    pub engine_timeout: Option<Duration>,
    pub cover_art_size: u32,
    pub max_upload_size_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let defaults = WorkingDirConfig::default();
        let working = WorkingDirConfig {
            folder: env::var("WORKING_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.folder),
            ttl: Duration::from_secs(
                env::var("WORKING_TTL_SECS")
                    .unwrap_or_else(|_| WORKING_TTL_SECS.to_string())
                    .parse()
                    .unwrap_or(WORKING_TTL_SECS),
            ),
            capacity: env::var("WORKING_CAPACITY")
                .unwrap_or_else(|_| WORKING_CAPACITY.to_string())
                .parse()
                .unwrap_or(WORKING_CAPACITY),
            sweep_interval: Duration::from_secs(
                env::var("WORKING_SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| WORKING_SWEEP_INTERVAL_SECS.to_string())
                    .parse()
                    .unwrap_or(WORKING_SWEEP_INTERVAL_SECS),
            ),
        };

        let engine_timeout_secs: u64 = env::var("ENGINE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);

        let max_upload_size_mb: usize = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);

        let config = Config {
            server_port: env::var("SERVER_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .unwrap_or(SERVER_PORT),
            environment,
            original_storage: StorageConfig::from_env("ORIGINAL")?,
            processed_storage: StorageConfig::from_env("PROCESSED")?,
            working,
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            engine_timeout: (engine_timeout_secs > 0)
                .then(|| Duration::from_secs(engine_timeout_secs)),
            cover_art_size: env::var("COVER_ART_SIZE")
                .unwrap_or_else(|_| COVER_ART_SIZE.to_string())
                .parse()
                .unwrap_or(COVER_ART_SIZE),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.original_storage.validate("ORIGINAL")?;
        self.processed_storage.validate("PROCESSED")?;

        if self.working.capacity == 0 {
            return Err(anyhow::anyhow!("WORKING_CAPACITY must be at least 1"));
        }

        if self.working.ttl.is_zero() {
            return Err(anyhow::anyhow!("WORKING_TTL_SECS must be greater than 0"));
        }

        if self.working.sweep_interval.is_zero() {
            return Err(anyhow::anyhow!(
                "WORKING_SWEEP_INTERVAL_SECS must be greater than 0"
            ));
        }

        if self.cover_art_size == 0 {
            return Err(anyhow::anyhow!("COVER_ART_SIZE must be greater than 0"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let environment = self.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }
}
