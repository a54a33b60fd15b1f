//! Mediacache Storage Library
//!
//! Key-addressed durable byte stores used for the original and processed tiers, plus
//! the two consumption disciplines every caller relies on:
//!
//! - [`open_with_backoff`] tolerates read-after-write lag on eventually consistent stores.
//! - [`AtomicUploader`] never lets a reader observe a partially written key.
//!
//! # Storage key format
//!
//! Keys are `/`-separated relative paths. Originals live at `{base_name}`, processed
//! artifacts at `{base_name}/cached[_wW][_hH][_bB].ext`. Keys must not contain `..`
//! or a leading `/`.

pub mod atomic;
pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod retry;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use atomic::AtomicUploader;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use mediacache_core::StorageBackend;
pub use memory::MemoryStorage;
pub use retry::{open_with_backoff, RetryPolicy};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteReader, Storage, StorageError, StorageResult};
