//! Downloading origin assets.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::debug;

/// Default timeout for origin downloads and uploads, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Transport-level download failure. HTTP error statuses are not errors at
/// this layer; they come back as a [`FetchedAsset`] with a non-2xx status.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

/// A downloaded response.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub status: u16,

    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,

    pub body: Bytes,
}

impl FetchedAsset {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for recording failures.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP GET of origin assets.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError>;
}

/// [`OriginFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client with the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl OriginFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedAsset, FetchError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        debug!(
            url = %url,
            status = status,
            content_type = ?content_type,
            bytes = body.len(),
            "Fetched origin"
        );

        Ok(FetchedAsset {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use axum::Router;

    async fn spawn_origin() -> String {
        let app = Router::new()
            .route(
                "/photo.png",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], b"\x89PNG\r\n".to_vec()) }),
            )
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "no such asset") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_is_success() {
        let asset = |status| FetchedAsset {
            status,
            content_type: None,
            body: Bytes::from_static(b"x"),
        };
        assert!(asset(200).is_success());
        assert!(asset(204).is_success());
        assert!(!asset(301).is_success());
        assert!(!asset(404).is_success());
    }

    #[tokio::test]
    async fn test_fetch_reports_status_type_and_body() {
        let base = spawn_origin().await;
        let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(5)).unwrap();

        let png = fetcher
            .fetch(&Url::parse(&format!("{base}/photo.png")).unwrap())
            .await
            .unwrap();
        assert!(png.is_success());
        assert_eq!(png.content_type.as_deref(), Some("image/png"));
        assert_eq!(&png.body[..], b"\x89PNG\r\n");

        let missing = fetcher
            .fetch(&Url::parse(&format!("{base}/missing")).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body_text(), "no such asset");
    }

    #[tokio::test]
    async fn test_fetch_transport_error() {
        let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(5)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let err = fetcher
            .fetch(&Url::parse("http://127.0.0.1:9/photo.png").unwrap())
            .await
            .unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
