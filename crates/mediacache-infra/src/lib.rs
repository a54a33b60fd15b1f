//! Mediacache Infrastructure Library
//!
//! Shared infrastructure used by the server binary and the orchestrator:
//! - Telemetry initialization
//! - The local working directory cache

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "working-dir")]
pub mod working_dir;

// Re-export commonly used types
#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, LogFormat};

#[cfg(feature = "working-dir")]
pub use working_dir::{RemovalCause, WorkingDirectory};
