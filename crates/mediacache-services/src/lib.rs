//! Mediacache Services Layer
//!
//! Hosts the orchestrator that ties the original store, the processed store, the
//! working directory and the transcode pipeline together, and re-exports what the
//! API crate needs so it depends on a single facade.

pub mod media_server;

pub use media_server::{MediaServer, ServedFile};

pub use mediacache_core::{
    Config, ErrorMetadata, LogLevel, MediaError, MediaResult, MimeCategory, RequestSpec,
    RequestSpecBuilder,
};
pub use mediacache_infra::WorkingDirectory;
pub use mediacache_processing::{FfmpegEngine, TranscodeEngine, TranscodePipeline};
pub use mediacache_storage::{create_storage, RetryPolicy, Storage, StorageBackend};
