//! Static extension to MIME type table.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Top-level MIME category, the part before the `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeCategory {
    Image,
    Audio,
    Video,
    Other,
}

impl MimeCategory {
    /// Whether the transformation engine can work on files of this category.
    pub fn is_media(self) -> bool {
        !matches!(self, MimeCategory::Other)
    }
}

impl Display for MimeCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MimeCategory::Image => write!(f, "image"),
            MimeCategory::Audio => write!(f, "audio"),
            MimeCategory::Video => write!(f, "video"),
            MimeCategory::Other => write!(f, "other"),
        }
    }
}

const MIME_TYPES: &[(&str, &str)] = &[
    // images
    (".avif", "image/avif"),
    (".bmp", "image/bmp"),
    (".gif", "image/gif"),
    (".heic", "image/heic"),
    (".heif", "image/heif"),
    (".jpeg", "image/jpeg"),
    (".jpg", "image/jpeg"),
    (".png", "image/png"),
    (".svg", "image/svg+xml"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".webp", "image/webp"),
    // audio
    (".aac", "audio/aac"),
    (".flac", "audio/flac"),
    (".m4a", "audio/mp4"),
    (".mp3", "audio/mpeg"),
    (".oga", "audio/ogg"),
    (".ogg", "audio/ogg"),
    (".opus", "audio/opus"),
    (".wav", "audio/wav"),
    (".weba", "audio/webm"),
    // video
    (".avi", "video/x-msvideo"),
    (".m4v", "video/mp4"),
    (".mkv", "video/x-matroska"),
    (".mov", "video/quicktime"),
    (".mp4", "video/mp4"),
    (".ogv", "video/ogg"),
    (".webm", "video/webm"),
    // everything else
    (".css", "text/css"),
    (".csv", "text/csv"),
    (".html", "text/html"),
    (".js", "text/javascript"),
    (".json", "application/json"),
    (".pdf", "application/pdf"),
    (".txt", "text/plain"),
    (".xml", "application/xml"),
    (".zip", "application/zip"),
];

/// Looks up the MIME type for an extension (with leading dot, any case).
pub fn mime_type(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

pub fn mime_category(extension: &str) -> MimeCategory {
    match mime_type(extension).and_then(|mime| mime.split('/').next()) {
        Some("image") => MimeCategory::Image,
        Some("audio") => MimeCategory::Audio,
        Some("video") => MimeCategory::Video,
        _ => MimeCategory::Other,
    }
}
