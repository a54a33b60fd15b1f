//! Engine argument construction.
//!
//! Pure functions from a [`RequestSpec`] and staged paths to an ffmpeg argument list.
//! Nothing here touches the filesystem.

use mediacache_core::{MimeCategory, RequestSpec};
use std::path::Path;

/// Center-square crop, applied before scaling when width == height.
const SQUARE_CROP_FILTER: &str = "crop='min(iw,ih)':'min(iw,ih)'";

const NO_FLAGS: &[&str] = &[];
const FASTSTART: &[&str] = &["-movflags", "+faststart"];

/// Codec and container for an image extension. Unknown extensions get neither.
fn image_codec(extension: &str) -> Option<(&'static str, &'static str)> {
    match extension {
        ".png" => Some(("png", "image2")),
        ".gif" => Some(("gif", "image2")),
        ".jpg" | ".jpeg" => Some(("mjpeg", "image2")),
        ".webp" => Some(("libwebp", "image2")),
        _ => None,
    }
}

/// Codec, container and extra flags for an audio extension.
fn audio_codec(extension: &str) -> (&'static str, &'static str, &'static [&'static str]) {
    match extension {
        ".aac" => ("aac", "adts", NO_FLAGS),
        ".flac" => ("flac", "flac", NO_FLAGS),
        ".m4a" => ("aac", "ipod", FASTSTART),
        ".ogg" => ("libvorbis", "ogg", NO_FLAGS),
        _ => ("libmp3lame", "mp3", NO_FLAGS),
    }
}

/// `scale` bound for one dimension: never larger than the source, `-1` when unknown.
fn scale_bound(value: u32, source: &str) -> String {
    if value == 0 {
        "-1".to_string()
    } else {
        format!("'min({},{})'", value, source)
    }
}

fn resize_filter(spec: &RequestSpec) -> String {
    let scale = format!(
        "scale={}:{}",
        scale_bound(spec.rounded_width(), "iw"),
        scale_bound(spec.rounded_height(), "ih")
    );

    if spec.width() == spec.height() {
        format!("{}, {}", SQUARE_CROP_FILTER, scale)
    } else {
        scale
    }
}

/// Format/codec arguments selected by the target category and extension.
pub fn format_arguments(spec: &RequestSpec) -> Vec<String> {
    let mut args = Vec::new();
    let extension = spec.target_extension();

    match spec.target_category() {
        MimeCategory::Image => {
            if spec.resize_requested() {
                args.push("-vf".to_string());
                args.push(resize_filter(spec));
            }
            if let Some((codec, container)) = image_codec(extension) {
                args.extend(["-c:v".to_string(), codec.to_string()]);
                args.extend(["-f".to_string(), container.to_string()]);
            }
        }
        MimeCategory::Audio => {
            let (codec, container, extra) = audio_codec(extension);
            args.extend(["-c:a".to_string(), codec.to_string()]);
            if spec.bitrate() > 0 {
                args.extend(["-b:a".to_string(), format!("{}k", spec.bitrate())]);
            }
            args.extend(extra.iter().map(|flag| flag.to_string()));
            args.extend(["-f".to_string(), container.to_string()]);
        }
        // The engine picks codec and container from the output extension.
        MimeCategory::Video | MimeCategory::Other => {}
    }

    args
}

/// Tag arguments for every metadata entry except the cover URL.
pub fn metadata_arguments(spec: &RequestSpec) -> Vec<String> {
    spec.tags()
        .flat_map(|(key, value)| {
            [
                "-metadata".to_string(),
                format!("{}={}", key, value.replace('\n', "\\n")),
            ]
        })
        .collect()
}

/// Second input plus stream mapping that embeds `cover` as front-cover art.
pub fn cover_arguments(cover: &Path) -> Vec<String> {
    let mut args = vec!["-i".to_string(), cover.to_string_lossy().to_string()];
    args.extend(
        [
            "-map",
            "0:a",
            "-map",
            "1:v",
            "-c:v",
            "copy",
            "-metadata:s:v",
            "title=Album Cover",
            "-metadata:s:v",
            "comment=Cover (front)",
        ]
        .iter()
        .map(|arg| arg.to_string()),
    );
    args
}

/// Full argument list for the main engine run.
pub fn build_arguments(
    spec: &RequestSpec,
    input: &Path,
    cover: Option<&Path>,
    output: &Path,
) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input.to_string_lossy().to_string()];

    if let Some(cover) = cover {
        args.extend(cover_arguments(cover));
    }

    args.extend(metadata_arguments(spec));
    args.extend(format_arguments(spec));
    args.push(output.to_string_lossy().to_string());
    args
}

/// Auxiliary run that turns a downloaded cover into a `size`x`size` JPEG.
pub fn cover_scale_arguments(input: &Path, size: u32, output: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!("{}, scale={}:{}", SQUARE_CROP_FILTER, size, size),
        "-frames:v".to_string(),
        "1".to_string(),
        "-c:v".to_string(),
        "mjpeg".to_string(),
        "-f".to_string(),
        "image2".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(original: &str, target: &str) -> mediacache_core::RequestSpecBuilder {
        RequestSpec::builder("asset", original).target_extension(target)
    }

    #[test]
    fn square_resize_crops_then_scales() {
        let spec = spec(".jpg", ".webp").dimensions(150, 150).build().unwrap();
        assert_eq!(
            format_arguments(&spec),
            vec![
                "-vf",
                "crop='min(iw,ih)':'min(iw,ih)', scale='min(200,iw)':'min(200,ih)'",
                "-c:v",
                "libwebp",
                "-f",
                "image2",
            ]
        );
    }

    #[test]
    fn single_dimension_keeps_aspect() {
        let spec = spec(".png", ".jpg").dimensions(320, 0).build().unwrap();
        assert_eq!(
            format_arguments(&spec),
            vec!["-vf", "scale='min(400,iw)':-1", "-c:v", "mjpeg", "-f", "image2"]
        );
    }

    #[test]
    fn completed_dimensions_are_used() {
        let spec = spec(".heic", ".webp")
            .dimensions(300, 0)
            .source_dimensions(1200, 800)
            .build()
            .unwrap();
        assert_eq!(
            format_arguments(&spec)[1],
            "scale='min(300,iw)':'min(200,ih)'"
        );
    }

    #[test]
    fn image_without_resize_has_no_filter() {
        let spec = spec(".png", ".gif").build().unwrap();
        assert_eq!(format_arguments(&spec), vec!["-c:v", "gif", "-f", "image2"]);
    }

    #[test]
    fn unknown_image_extension_passes_container_default() {
        let spec = spec(".png", ".bmp").build().unwrap();
        assert!(format_arguments(&spec).is_empty());
    }

    #[test]
    fn audio_table() {
        let cases = [
            (".aac", vec!["-c:a", "aac", "-f", "adts"]),
            (".flac", vec!["-c:a", "flac", "-f", "flac"]),
            (
                ".m4a",
                vec!["-c:a", "aac", "-movflags", "+faststart", "-f", "ipod"],
            ),
            (".ogg", vec!["-c:a", "libvorbis", "-f", "ogg"]),
            (".mp3", vec!["-c:a", "libmp3lame", "-f", "mp3"]),
        ];

        for (extension, expected) in cases {
            let spec = spec(".wav", extension).build().unwrap();
            assert_eq!(format_arguments(&spec), expected, "{}", extension);
        }
    }

    #[test]
    fn bitrate_only_when_positive() {
        let spec = spec(".mov", ".mp3").bitrate(128).build().unwrap();
        assert_eq!(
            format_arguments(&spec),
            vec!["-c:a", "libmp3lame", "-b:a", "128k", "-f", "mp3"]
        );
    }

    #[test]
    fn video_has_no_format_arguments() {
        let spec = spec(".mov", ".mp4").dimensions(640, 480).build().unwrap();
        assert!(format_arguments(&spec).is_empty());
    }

    #[test]
    fn full_argument_order() {
        let spec = spec(".flac", ".mp3")
            .metadata("title", "Line one\nLine two")
            .metadata("cover", "https://example.com/c.jpg")
            .build()
            .unwrap();

        let args = build_arguments(
            &spec,
            Path::new("/stage/input.flac"),
            Some(Path::new("/stage/cover.jpg")),
            Path::new("/stage/output.mp3"),
        );

        assert_eq!(
            args,
            vec![
                "-i",
                "/stage/input.flac",
                "-i",
                "/stage/cover.jpg",
                "-map",
                "0:a",
                "-map",
                "1:v",
                "-c:v",
                "copy",
                "-metadata:s:v",
                "title=Album Cover",
                "-metadata:s:v",
                "comment=Cover (front)",
                "-metadata",
                "title=Line one\\nLine two",
                "-c:a",
                "libmp3lame",
                "-f",
                "mp3",
                "/stage/output.mp3",
            ]
        );
    }
}
