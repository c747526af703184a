//! Remote image hosting.
//!
//! Normalized images are re-hosted on an external service; the returned URL
//! becomes the block's `source_url`.

pub mod imgbb;

use async_trait::async_trait;
use thiserror::Error;

pub use imgbb::{ImgBbClient, ImgBbConfig};

/// Upload failures. The display text is recorded on the block as-is.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The host answered with a non-success status; the display text is the
    /// raw response body.
    #[error("{body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed upload response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("upload response has no image URL")]
    MissingUrl,
}

/// A successfully hosted image.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedImage {
    pub url: String,

    /// Link that removes the upload again. Logged, never stored.
    pub delete_url: Option<String>,
}

/// An external image hosting service.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        file_name: &str,
    ) -> Result<HostedImage, UploadError>;
}

/// Upload name for a re-encoded image: the original stem with the new
/// extension.
pub fn upload_file_name(display_name: &str, extension: &str) -> String {
    display_name
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(stem, _)| format!("{}.{}", stem, extension))
        .unwrap_or_else(|| format!("{}.{}", display_name, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_file_name() {
        assert_eq!(upload_file_name("photo.jpg", "webp"), "photo.webp");
        assert_eq!(upload_file_name("holiday.final.png", "webp"), "holiday.final.webp");
        assert_eq!(upload_file_name("image", "webp"), "image.webp");
        assert_eq!(upload_file_name(".hidden", "webp"), ".hidden.webp");
    }

    #[test]
    fn test_rejected_displays_raw_body() {
        let err = UploadError::Rejected {
            status: 400,
            body: r#"{"status_code":400,"error":{"message":"Invalid API v1 key."}}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"{"status_code":400,"error":{"message":"Invalid API v1 key."}}"#
        );
    }
}
