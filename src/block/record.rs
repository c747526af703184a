//! Article block records.
//!
//! A block is a media placeholder inside an article. Authoring creates it
//! with an `origin` URL and no `source_url`; the normalizer later rehosts the
//! media and fills in `source_url`, `description` and the dimensions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalization status of a block, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    /// Has an origin, not yet rehosted, no recorded failure.
    Pending,

    /// Rehosted; `source_url` is set.
    Done,

    /// Last attempt failed; still eligible unless the retry policy says otherwise.
    Failed,

    /// Neither an origin nor a hosted URL (text-only block).
    Empty,
}

/// A content-article block as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Store-assigned identifier.
    pub id: i64,

    /// Article this block belongs to.
    pub article_id: Uuid,

    pub title: Option<String>,

    /// Rendered HTML fragment shown to readers.
    pub description: Option<String>,

    /// Absolute URL of the raw, not yet normalized asset.
    pub origin: Option<String>,

    /// Hosted URL of the normalized asset. `None` while pending.
    pub source_url: Option<String>,

    /// Last normalization error, cleared on success.
    pub media_error: Option<String>,

    pub width: Option<u32>,
    pub height: Option<u32>,

    /// Display name, used as alt text and upload name.
    pub file_name: Option<String>,

    /// Fractional ordering key among siblings, see [`crate::rank`].
    pub rank: String,

    /// Number of normalization attempts that ended in failure.
    pub media_attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by authoring when a block is created.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBlock {
    pub article_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub origin: Option<String>,
    pub file_name: Option<String>,
}

impl Block {
    /// A block is eligible for normalization while it has an origin but no
    /// hosted URL.
    pub fn is_eligible(&self) -> bool {
        self.source_url.is_none() && self.origin.is_some()
    }

    pub fn status(&self) -> MediaStatus {
        match (&self.source_url, &self.origin, &self.media_error) {
            (Some(_), _, _) => MediaStatus::Done,
            (None, Some(_), Some(_)) => MediaStatus::Failed,
            (None, Some(_), None) => MediaStatus::Pending,
            (None, None, _) => MediaStatus::Empty,
        }
    }

    /// Name used as alt text and as the upload file name.
    ///
    /// Falls back to the last path segment of the origin, then to `"image"`.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.file_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }

        self.origin
            .as_deref()
            .and_then(|origin| reqwest::Url::parse(origin).ok())
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| "image".to_string())
    }

    /// Record a successful normalization.
    pub fn mark_normalized(&mut self, url: &str, width: u32, height: u32, now: DateTime<Utc>) {
        self.description = Some(image_fragment(url, width, height, &self.display_name()));
        self.source_url = Some(url.to_string());
        self.width = Some(width);
        self.height = Some(height);
        self.media_error = None;
        self.updated_at = now;
    }

    /// Record a failed normalization. `source_url` stays unset so the block
    /// remains a candidate for later runs.
    pub fn mark_failed(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.media_error = Some(error.into());
        self.media_attempts = self.media_attempts.saturating_add(1);
        self.updated_at = now;
    }

    /// JSON view returned by the API.
    pub fn view(&self) -> BlockView {
        BlockView {
            id: self.id,
            article_id: self.article_id,
            title: self.title.clone(),
            description: self.description.clone(),
            origin: self.origin.clone(),
            source_url: self.source_url.clone(),
            media_error: self.media_error.clone(),
            status: self.status(),
            width: self.width.unwrap_or(0),
            height: self.height.unwrap_or(0),
            file_name: self.file_name.clone(),
            rank: self.rank.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// API representation of a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub id: i64,
    pub article_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub origin: Option<String>,
    pub source_url: Option<String>,
    pub media_error: Option<String>,
    pub status: MediaStatus,
    pub width: u32,
    pub height: u32,
    pub file_name: Option<String>,
    pub rank: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// HTML fragment embedding a hosted image.
pub fn image_fragment(url: &str, width: u32, height: u32, alt: &str) -> String {
    format!(
        r#"<img src="{}" width="{}" height="{}" alt="{}" />"#,
        escape_attr(url),
        width,
        height,
        escape_attr(alt)
    )
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn pending_block(id: i64, origin: &str) -> Block {
        let now = Utc::now();
        Block {
            id,
            article_id: Uuid::nil(),
            title: None,
            description: None,
            origin: Some(origin.to_string()),
            source_url: None,
            media_error: None,
            width: None,
            height: None,
            file_name: None,
            rank: "n".to_string(),
            media_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_eligibility() {
        let mut block = pending_block(1, "https://host/photo.jpg");
        assert!(block.is_eligible());
        assert_eq!(block.status(), MediaStatus::Pending);

        block.mark_failed("invalid-content-type", Utc::now());
        assert!(block.is_eligible());
        assert_eq!(block.status(), MediaStatus::Failed);
        assert_eq!(block.media_attempts, 1);

        block.mark_normalized("https://cdn/x.webp", 800, 600, Utc::now());
        assert!(!block.is_eligible());
        assert_eq!(block.status(), MediaStatus::Done);
        assert!(block.media_error.is_none());

        block.origin = None;
        block.source_url = None;
        assert!(!block.is_eligible());
        assert_eq!(block.status(), MediaStatus::Empty);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut block = pending_block(1, "https://host/albums/photo.jpg?size=big");
        assert_eq!(block.display_name(), "photo.jpg");

        block.file_name = Some("Cover shot".to_string());
        assert_eq!(block.display_name(), "Cover shot");

        block.file_name = None;
        block.origin = Some("https://host/".to_string());
        assert_eq!(block.display_name(), "image");
    }

    #[test]
    fn test_mark_normalized_renders_description() {
        let mut block = pending_block(1, "https://host/photo.jpg");
        block.file_name = Some(r#"a "quoted" <name>"#.to_string());
        let before = block.updated_at;

        block.mark_normalized("https://cdn/x.webp", 800, 600, before + chrono::Duration::seconds(5));

        let description = block.description.as_deref().unwrap();
        assert!(description.contains(r#"src="https://cdn/x.webp""#));
        assert!(description.contains(r#"width="800" height="600""#));
        assert!(description.contains("alt=\"a &quot;quoted&quot; &lt;name&gt;\""));
        assert!(block.updated_at > before);
    }

    #[test]
    fn test_view_defaults_missing_dimensions() {
        let block = pending_block(7, "https://host/photo.jpg");
        let json = serde_json::to_value(block.view()).unwrap();

        assert_eq!(json["width"], 0);
        assert_eq!(json["height"], 0);
        assert_eq!(json["sourceUrl"], serde_json::Value::Null);
        assert_eq!(json["status"], "pending");
    }
}
