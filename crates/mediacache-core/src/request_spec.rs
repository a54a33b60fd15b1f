//! Request model
//!
//! A `RequestSpec` describes which asset a caller wants and how it should be
//! transformed. Every cache key and engine parameter is derived from it, so two specs
//! that round to the same dimensions/bitrate share one cached artifact.

use std::collections::BTreeMap;

use crate::error::{MediaError, MediaResult};
use crate::mime::{mime_category, mime_type, MimeCategory};

/// Audio extensions the engine argument table knows how to produce.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &[".aac", ".flac", ".m4a", ".mp3", ".ogg"];

/// Fallback for audio targets outside `SUPPORTED_AUDIO_EXTENSIONS`.
pub const DEFAULT_AUDIO_EXTENSION: &str = ".mp3";

/// Metadata key naming a cover-art URL rather than a container tag.
pub const COVER_METADATA_KEY: &str = "cover";

const PROCESSED_FILE_PREFIX: &str = "cached";

/// Rounds up to the next multiple of 100. Zero stays zero.
pub fn round100(number: u32) -> u32 {
    number.div_ceil(100).saturating_mul(100)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    base_name: String,
    original_extension: String,
    target_extension: String,
    width: u32,
    height: u32,
    bitrate: u32,
    metadata: BTreeMap<String, String>,
    cache_enabled: bool,
    source_dimensions: Option<(u32, u32)>,
}

impl RequestSpec {
    pub fn builder(
        base_name: impl Into<String>,
        original_extension: impl Into<String>,
    ) -> RequestSpecBuilder {
        RequestSpecBuilder::new(base_name, original_extension)
    }

    /// Splits the last path segment of a request into base name and extension.
    ///
    /// `photo.webp` becomes base `photo` with target `.webp`. A segment without an
    /// extension uses `default_extension`. The original extension defaults to the
    /// target extension and can be overridden on the returned builder.
    pub fn from_filename(path: &str, default_extension: &str) -> RequestSpecBuilder {
        let segment = path.rsplit('/').next().unwrap_or(path);
        let (base_name, extension) = match segment.rsplit_once('.') {
            Some((base, ext)) if !base.is_empty() && !ext.is_empty() => {
                (base.to_string(), format!(".{}", ext))
            }
            _ => (segment.to_string(), default_extension.to_string()),
        };

        RequestSpecBuilder::new(base_name, extension.clone()).target_extension(extension)
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn original_extension(&self) -> &str {
        &self.original_extension
    }

    pub fn target_extension(&self) -> &str {
        &self.target_extension
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn cover_url(&self) -> Option<&str> {
        self.metadata
            .get(COVER_METADATA_KEY)
            .map(String::as_str)
            .filter(|url| !url.is_empty())
    }

    /// Metadata entries other than the cover URL, in key order.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata
            .iter()
            .filter(|(key, _)| key.as_str() != COVER_METADATA_KEY)
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn source_dimensions(&self) -> Option<(u32, u32)> {
        self.source_dimensions
    }

    pub fn with_source_dimensions(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.source_dimensions = Some((width, height));
        }
        self
    }

    /// Category of the stored original; decides whether the engine applies at all.
    pub fn original_category(&self) -> MimeCategory {
        mime_category(&self.original_extension)
    }

    /// Category of the requested output; decides codec selection.
    pub fn target_category(&self) -> MimeCategory {
        mime_category(&self.target_extension)
    }

    pub fn content_type(&self) -> &'static str {
        mime_type(&self.target_extension).unwrap_or("application/octet-stream")
    }

    pub fn resize_requested(&self) -> bool {
        self.width > 0 || self.height > 0
    }

    /// True when exactly one dimension is requested and the other could be derived
    /// from the source aspect ratio.
    pub fn needs_source_dimensions(&self) -> bool {
        (self.width == 0) != (self.height == 0)
            && self.source_dimensions.is_none()
            && matches!(
                self.original_category(),
                MimeCategory::Image | MimeCategory::Video
            )
    }

    /// Requested dimensions with a single missing one completed from the source
    /// aspect ratio, before rounding.
    pub fn effective_dimensions(&self) -> (u32, u32) {
        let (width, height) = (self.width, self.height);

        let source = match self.source_dimensions {
            Some((sw, sh)) if sw > 0 && sh > 0 => (sw as u64, sh as u64),
            _ => return (width, height),
        };

        if !matches!(
            self.original_category(),
            MimeCategory::Image | MimeCategory::Video
        ) {
            return (width, height);
        }

        match (width, height) {
            (w, 0) if w > 0 => (w, scale_dimension(w, source.1, source.0)),
            (0, h) if h > 0 => (scale_dimension(h, source.0, source.1), h),
            other => other,
        }
    }

    pub fn rounded_width(&self) -> u32 {
        round100(self.effective_dimensions().0)
    }

    pub fn rounded_height(&self) -> u32 {
        round100(self.effective_dimensions().1)
    }

    /// Directory in the processed store holding every derived artifact of this asset.
    pub fn processed_dir(&self) -> &str {
        &self.base_name
    }

    pub fn processed_filename(&self) -> String {
        format!(
            "{}{}{}",
            PROCESSED_FILE_PREFIX,
            self.variant_suffix(),
            self.target_extension
        )
    }

    /// The cache key: `base_name/cached[_wW][_hH][_bB].ext`.
    pub fn processed_path(&self) -> String {
        format!("{}/{}", self.processed_dir(), self.processed_filename())
    }

    pub fn working_filename(&self) -> String {
        format!(
            "{}{}{}",
            self.base_name,
            self.variant_suffix(),
            self.target_extension
        )
    }

    /// Whether `entry` is a working filename of some rendition of `base_name`:
    /// `base_name[_wW][_hH][_bB][.ext]`.
    pub fn is_working_filename_of(entry: &str, base_name: &str) -> bool {
        let Some(mut rest) = entry.strip_prefix(base_name) else {
            return false;
        };

        for marker in ["_w", "_h", "_b"] {
            if let Some(after) = rest.strip_prefix(marker) {
                let digits = after.len()
                    - after
                        .trim_start_matches(|c: char| c.is_ascii_digit())
                        .len();
                if digits == 0 {
                    return false;
                }
                rest = &after[digits..];
            }
        }

        rest.is_empty()
            || rest
                .strip_prefix('.')
                .is_some_and(|ext| !ext.is_empty() && !ext.contains('.'))
    }

    pub fn download_filename(&self) -> String {
        format!("{}{}", self.base_name, self.target_extension)
    }

    /// Suffix shared by the processed and working names. Only values that change the
    /// output bytes for the target category are included.
    fn variant_suffix(&self) -> String {
        let mut suffix = String::new();

        match self.target_category() {
            MimeCategory::Image => {
                let (width, height) = (self.rounded_width(), self.rounded_height());
                if width != 0 {
                    suffix.push_str(&format!("_w{}", width));
                }
                if height != 0 {
                    suffix.push_str(&format!("_h{}", height));
                }
            }
            MimeCategory::Audio => {
                if self.bitrate != 0 {
                    suffix.push_str(&format!("_b{}", self.bitrate));
                }
            }
            MimeCategory::Video | MimeCategory::Other => {}
        }

        suffix
    }
}

fn scale_dimension(known: u32, numerator: u64, denominator: u64) -> u32 {
    let scaled = (known as u64 * numerator + denominator / 2) / denominator;
    scaled.clamp(1, u32::MAX as u64) as u32
}

fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim().to_ascii_lowercase();
    if extension.is_empty() || extension.starts_with('.') {
        extension
    } else {
        format!(".{}", extension)
    }
}

/// Builder for [`RequestSpec`]. `build` validates and normalizes.
#[derive(Debug, Clone)]
pub struct RequestSpecBuilder {
    base_name: String,
    original_extension: String,
    target_extension: Option<String>,
    width: u32,
    height: u32,
    bitrate: u32,
    metadata: BTreeMap<String, String>,
    cache_enabled: bool,
    source_dimensions: Option<(u32, u32)>,
}

impl RequestSpecBuilder {
    pub fn new(base_name: impl Into<String>, original_extension: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            original_extension: original_extension.into(),
            target_extension: None,
            width: 0,
            height: 0,
            bitrate: 0,
            metadata: BTreeMap::new(),
            cache_enabled: true,
            source_dimensions: None,
        }
    }

    pub fn original_extension(mut self, extension: impl Into<String>) -> Self {
        self.original_extension = extension.into();
        self
    }

    pub fn target_extension(mut self, extension: impl Into<String>) -> Self {
        self.target_extension = Some(extension.into());
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn source_dimensions(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.source_dimensions = Some((width, height));
        }
        self
    }

    pub fn build(self) -> MediaResult<RequestSpec> {
        let base_name = self.base_name.trim().to_string();

        if base_name.is_empty() {
            return Err(MediaError::InvalidInput(
                "File name must not be empty".to_string(),
            ));
        }

        if base_name.contains('/') || base_name.contains('\\') || base_name.contains("..") {
            return Err(MediaError::InvalidInput(format!(
                "File name contains invalid characters: {}",
                base_name
            )));
        }

        let original_extension = normalize_extension(&self.original_extension);
        let mut target_extension = self
            .target_extension
            .as_deref()
            .map(normalize_extension)
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| original_extension.clone());

        if target_extension.is_empty() {
            return Err(MediaError::InvalidInput(format!(
                "No file extension for {}",
                base_name
            )));
        }

        if mime_category(&target_extension) == MimeCategory::Audio
            && !SUPPORTED_AUDIO_EXTENSIONS.contains(&target_extension.as_str())
        {
            tracing::debug!(
                requested = %target_extension,
                fallback = DEFAULT_AUDIO_EXTENSION,
                "Unsupported audio extension, using default"
            );
            target_extension = DEFAULT_AUDIO_EXTENSION.to_string();
        }

        Ok(RequestSpec {
            base_name,
            original_extension,
            target_extension,
            width: self.width,
            height: self.height,
            bitrate: self.bitrate,
            metadata: self.metadata,
            cache_enabled: self.cache_enabled,
            source_dimensions: self.source_dimensions,
        })
    }
}
