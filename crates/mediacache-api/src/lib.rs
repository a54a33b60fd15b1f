//! Mediacache API Library
//!
//! HTTP handlers, error rendering and application setup for the media cache server.

mod handlers;

pub mod error;
pub mod setup;
pub mod state;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
