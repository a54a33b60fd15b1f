use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use mediacache_core::{MediaError, MediaResult, RequestSpec};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Cached renditions never change for a given URL.
const IMMUTABLE_ETAG: &str = "IMMUTABLE";
const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=86400, immutable";
const METADATA_PREFIX: &str = "meta.";

/// `GET /media/{file}`
///
/// Query parameters: `width`, `height`, `bitrate`, `original` (extension of the stored
/// original, defaults to the requested one), `cache` (default `true`),
/// `source_width`/`source_height`, and `meta.<key>` container tags.
pub async fn get_media(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, HttpAppError> {
    let spec = parse_request(&file, &params)?;

    if !spec.cache_enabled() {
        let mut buffer = Vec::new();
        state.media.get(&spec, &mut buffer).await?;

        return build_response(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, spec.content_type())
                .header(header::CONTENT_LENGTH, buffer.len())
                .header(
                    header::CONTENT_DISPOSITION,
                    content_disposition(&spec.download_filename()),
                )
                .header(header::CACHE_CONTROL, "no-store")
                .body(Body::from(buffer)),
        );
    }

    let served = state.media.serve(&spec).await?;

    tracing::debug!(
        file = %served.download_filename,
        size_bytes = served.len,
        "Serving working file"
    );

    build_response(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, served.content_type)
            .header(header::CONTENT_LENGTH, served.len)
            .header(
                header::CONTENT_DISPOSITION,
                content_disposition(&served.download_filename),
            )
            .header(header::ETAG, IMMUTABLE_ETAG)
            .header(header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL)
            .body(Body::from_stream(ReaderStream::new(served.file))),
    )
}

fn build_response(response: Result<Response, axum::http::Error>) -> Result<Response, HttpAppError> {
    response.map_err(|e| {
        tracing::error!(error = %e, "Failed to build response");
        HttpAppError(MediaError::Internal(e.to_string()))
    })
}

/// `inline` disposition with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}

fn parse_number<T: FromStr>(params: &HashMap<String, String>, name: &str) -> MediaResult<Option<T>> {
    match params.get(name).map(|value| value.trim()) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            MediaError::InvalidInput(format!("Query parameter {} must be a non-negative integer", name))
        }),
    }
}

fn parse_flag(params: &HashMap<String, String>, name: &str, default: bool) -> MediaResult<bool> {
    match params.get(name).map(|value| value.trim().to_lowercase()) {
        None => Ok(default),
        Some(value) => match value.as_str() {
            "" | "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(MediaError::InvalidInput(format!(
                "Query parameter {} must be true or false",
                name
            ))),
        },
    }
}

/// Build a [`RequestSpec`] from the path segment and query string.
pub(crate) fn parse_request(
    file: &str,
    params: &HashMap<String, String>,
) -> MediaResult<RequestSpec> {
    let mut builder = RequestSpec::from_filename(file, "");

    if let Some(original) = params.get("original").filter(|value| !value.trim().is_empty()) {
        builder = builder.original_extension(original.as_str());
    }

    let width = parse_number::<u32>(params, "width")?.unwrap_or(0);
    let height = parse_number::<u32>(params, "height")?.unwrap_or(0);
    builder = builder.dimensions(width, height);

    if let Some(bitrate) = parse_number::<u32>(params, "bitrate")? {
        builder = builder.bitrate(bitrate);
    }

    if let (Some(source_width), Some(source_height)) = (
        parse_number::<u32>(params, "source_width")?,
        parse_number::<u32>(params, "source_height")?,
    ) {
        builder = builder.source_dimensions(source_width, source_height);
    }

    builder = builder.cache(parse_flag(params, "cache", true)?);

    for (key, value) in params {
        if let Some(tag) = key.strip_prefix(METADATA_PREFIX) {
            if !tag.is_empty() {
                builder = builder.metadata(tag, value.as_str());
            }
        }
    }

    builder.build()
}
