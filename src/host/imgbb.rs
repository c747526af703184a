//! ImgBB-compatible upload client.
//!
//! Request: `POST {base}/1/upload?name=image` with a multipart form carrying
//! the base64 image, the API key, and the content type as a field name.

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{HostedImage, ImageHost, UploadError};

/// Public ImgBB API endpoint.
pub const DEFAULT_IMGBB_URL: &str = "https://api.imgbb.com";

/// Connection settings for the image host.
#[derive(Clone)]
pub struct ImgBbConfig {
    /// API base URL, without the `/1/upload` path.
    pub base_url: String,

    /// API key sent with every upload.
    pub api_key: String,
}

impl Default for ImgBbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_IMGBB_URL.to_string(),
            api_key: String::new(),
        }
    }
}

impl std::fmt::Debug for ImgBbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImgBbConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// Response envelope.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub data: Option<UploadedImage>,

    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub status: Option<u16>,
}

/// The parts of an uploaded image's metadata the client uses. ImgBB sends
/// more (ids, thumbnails, sizes); those are ignored.
#[derive(Debug, Deserialize)]
pub struct UploadedImage {
    /// Direct link to the full-size image.
    pub url: Option<String>,

    pub delete_url: Option<String>,
}

/// Interpret the host's answer to an upload request.
pub fn parse_upload_response(status: u16, body: &str) -> Result<HostedImage, UploadError> {
    if !(200..300).contains(&status) {
        return Err(UploadError::Rejected {
            status,
            body: body.to_string(),
        });
    }

    let envelope: UploadResponse = serde_json::from_str(body)?;
    if envelope.success == Some(false) {
        return Err(UploadError::Rejected {
            status: envelope.status.unwrap_or(status),
            body: body.to_string(),
        });
    }

    let data = envelope.data.ok_or(UploadError::MissingUrl)?;
    let url = data
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(UploadError::MissingUrl)?;

    Ok(HostedImage {
        url,
        delete_url: data.delete_url,
    })
}

/// [`ImageHost`] for the ImgBB upload API.
#[derive(Debug, Clone)]
pub struct ImgBbClient {
    client: Client,
    config: ImgBbConfig,
}

impl ImgBbClient {
    pub fn new(client: Client, config: ImgBbConfig) -> Self {
        if config.api_key.is_empty() {
            warn!("No image host API key configured - uploads will likely be rejected");
        }
        Self { client, config }
    }

    pub fn upload_url(&self) -> String {
        format!(
            "{}/1/upload?name=image",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Multipart fields, in order.
    pub fn form_fields(&self, bytes: &[u8], content_type: &str) -> Vec<(String, String)> {
        vec![
            (
                "image".to_string(),
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ),
            ("key".to_string(), self.config.api_key.clone()),
            (content_type.to_string(), "description".to_string()),
        ]
    }
}

#[async_trait]
impl ImageHost for ImgBbClient {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        file_name: &str,
    ) -> Result<HostedImage, UploadError> {
        let size = bytes.len();
        let form = self
            .form_fields(&bytes, content_type)
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        debug!(file_name = %file_name, bytes = size, "Uploading image");

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let hosted = parse_upload_response(status, &body)?;
        info!(
            file_name = %file_name,
            url = %hosted.url,
            delete_url = hosted.delete_url.as_deref().unwrap_or(""),
            bytes = size,
            "Uploaded image"
        );
        Ok(hosted)
    }
}
