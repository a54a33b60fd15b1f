//! Mediacache Core Library
//!
//! This crate provides the request model, error types, MIME table and configuration
//! shared by every mediacache component.

pub mod config;
pub mod error;
pub mod mime;
pub mod request_spec;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, StorageConfig, WorkingDirConfig};
pub use error::{ErrorMetadata, LogLevel, MediaError, MediaResult};
pub use mime::{mime_category, mime_type, MimeCategory};
pub use request_spec::{round100, RequestSpec, RequestSpecBuilder};
pub use storage_types::StorageBackend;
