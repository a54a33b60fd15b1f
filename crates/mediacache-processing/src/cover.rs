//! Cover art retrieval for audio outputs.

use async_trait::async_trait;
use bytes::Bytes;
use mediacache_core::MediaResult;

#[async_trait]
pub trait CoverSource: Send + Sync {
    /// Fetch the raw cover image named by `url`.
    async fn fetch(&self, url: &str) -> MediaResult<Bytes>;
}

#[cfg(feature = "cover-art")]
pub use http::HttpCoverSource;

#[cfg(feature = "cover-art")]
mod http {
    use super::CoverSource;
    use async_trait::async_trait;
    use bytes::{Bytes, BytesMut};
    use mediacache_core::{MediaError, MediaResult};
    use std::time::Duration;

    const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
    const MAX_COVER_BYTES: usize = 20 * 1024 * 1024;

    /// Downloads covers over HTTP(S).
    ///
    /// Bodies are read chunk by chunk and abandoned as soon as they pass `max_bytes`,
    /// whether or not the server announced a length.
    #[derive(Debug, Clone)]
    pub struct HttpCoverSource {
        client: reqwest::Client,
        max_bytes: usize,
    }

    impl HttpCoverSource {
        pub fn new() -> MediaResult<Self> {
            let client = reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .map_err(|e| MediaError::Internal(format!("Failed to build HTTP client: {}", e)))?;
            Ok(Self {
                client,
                max_bytes: MAX_COVER_BYTES,
            })
        }

        pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
            self.max_bytes = max_bytes;
            self
        }

        fn too_large(&self, url: &str, size: u64) -> MediaError {
            MediaError::InvalidInput(format!(
                "Cover {} exceeds {} bytes (got at least {})",
                url, self.max_bytes, size
            ))
        }
    }

    #[async_trait]
    impl CoverSource for HttpCoverSource {
        async fn fetch(&self, url: &str) -> MediaResult<Bytes> {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(MediaError::InvalidInput(format!(
                    "Cover URL must be http or https: {}",
                    url
                )));
            }

            let start = std::time::Instant::now();
            let mut response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| MediaError::Io(format!("Failed to fetch cover {}: {}", url, e)))?;

            if let Some(declared) = response.content_length() {
                if declared > self.max_bytes as u64 {
                    return Err(self.too_large(url, declared));
                }
            }

            let mut body = BytesMut::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| MediaError::Io(format!("Failed to read cover {}: {}", url, e)))?
            {
                if body.len() + chunk.len() > self.max_bytes {
                    return Err(self.too_large(url, (body.len() + chunk.len()) as u64));
                }
                body.extend_from_slice(&chunk);
            }

            if body.is_empty() {
                return Err(MediaError::InvalidInput(format!("Cover {} is empty", url)));
            }

            tracing::debug!(
                url = %url,
                size_bytes = body.len(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Fetched cover art"
            );

            Ok(body.freeze())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use axum::{body::Body, routing::get, Router};

        async fn serve_covers() -> String {
            let app = Router::new()
                .route("/small.jpg", get(|| async { vec![7u8; 512] }))
                .route("/declared.jpg", get(|| async { vec![7u8; 4096] }))
                .route(
                    "/streamed.jpg",
                    get(|| async {
                        let chunks = (0..8)
                            .map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 512])));
                        Body::from_stream(futures::stream::iter(chunks))
                    }),
                );

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}", addr)
        }

        #[tokio::test]
        async fn fetches_covers_within_limit() {
            let base = serve_covers().await;
            let source = HttpCoverSource::new().unwrap().with_max_bytes(1024);

            let body = source.fetch(&format!("{}/small.jpg", base)).await.unwrap();
            assert_eq!(body.len(), 512);
        }

        #[tokio::test]
        async fn rejects_declared_oversized_covers() {
            let base = serve_covers().await;
            let source = HttpCoverSource::new().unwrap().with_max_bytes(1024);

            let err = source
                .fetch(&format!("{}/declared.jpg", base))
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::InvalidInput(_)));
        }

        #[tokio::test]
        async fn stops_reading_streamed_oversized_covers() {
            let base = serve_covers().await;
            let source = HttpCoverSource::new().unwrap().with_max_bytes(1024);

            let err = source
                .fetch(&format!("{}/streamed.jpg", base))
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::InvalidInput(_)));
        }

        #[tokio::test]
        async fn rejects_non_http_urls() {
            let source = HttpCoverSource::new().unwrap();
            let err = source.fetch("file:///etc/passwd").await.unwrap_err();
            assert!(matches!(err, MediaError::InvalidInput(_)));
        }
    }
}
