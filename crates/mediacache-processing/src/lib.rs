//! Mediacache Processing Library
//!
//! Turns an original byte stream into the artifact a [`RequestSpec`] asks for. The
//! actual codec work is delegated to an external engine (ffmpeg); this crate builds
//! its argument list, stages the seekable files it needs and cleans them up.
//!
//! [`RequestSpec`]: mediacache_core::RequestSpec

pub mod args;
pub mod cover;
pub mod engine;
pub mod pipeline;
#[cfg(feature = "image")]
pub mod probe;
pub mod staging;

// Re-export commonly used types
pub use args::{build_arguments, cover_scale_arguments, format_arguments};
pub use cover::CoverSource;
#[cfg(feature = "cover-art")]
pub use cover::HttpCoverSource;
pub use engine::{FfmpegEngine, TranscodeEngine};
pub use pipeline::{TranscodeOutput, TranscodePipeline};
#[cfg(feature = "image")]
pub use probe::{probe_image_dimensions, read_prefix, PROBE_PREFIX_BYTES};
pub use staging::StagingArea;
