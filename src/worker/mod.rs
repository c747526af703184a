//! Batch normalizer for block media.
//!
//! One run:
//! 1. Selects a bounded batch of eligible blocks, newest first
//! 2. For each block, sequentially: fetch the origin, sniff its type,
//!    transform it, upload the result
//! 3. Records the outcome on the block and stages it
//! 4. Commits every staged block in one transaction
//!
//! A failing block never aborts the batch; its error string is stored on the
//! block and it stays eligible for the next run (subject to the retry policy).

use std::io::Cursor;

use anyhow::Context;
use chrono::Utc;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::fetch::OriginFetcher;
use crate::host::{upload_file_name, ImageHost};
use crate::media::{self, ImageCodec, ImageTransformer, WebpCompression, DEFAULT_TARGET_WIDTH};
use crate::store::{BlockStore, ChangeSet, EligibleQuery, RetryPolicy, DEFAULT_BATCH_SIZE};

/// Recorded when the origin is not an absolute http(s) URL.
pub const INVALID_ORIGIN: &str = "invalid-origin";

/// Recorded when the downloaded payload is not an image.
pub const INVALID_CONTENT_TYPE: &str = "invalid-content-type";

/// Configuration for the normalizer.
#[derive(Clone, PartialEq)]
pub struct WorkerConfig {
    /// Output width in pixels; height follows the source aspect ratio.
    pub target_width: u32,

    /// Maximum number of blocks per run.
    pub batch_size: usize,

    /// Whether repeatedly failing blocks keep being selected.
    pub retry: RetryPolicy,

    /// WebP compression of the output.
    pub compression: WebpCompression,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::Forever,
            compression: WebpCompression::default(),
        }
    }
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("target_width", &self.target_width)
            .field("batch_size", &self.batch_size)
            .field("retry", &self.retry)
            .field("compression", &self.compression)
            .finish()
    }
}

/// Hosted result of a successful normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedMedia {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Result of processing one block.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(HostedMedia),
    Failed(String),
}

/// Summary of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Blocks picked up by the run.
    pub selected: usize,
    pub done: usize,
    pub failed: usize,

    /// Blocks written by the final commit.
    pub committed: usize,
}

/// Drives fetch → sniff → transform → upload for a batch of blocks.
pub struct Normalizer<S, F, H, C> {
    store: S,
    fetcher: F,
    host: H,
    transformer: ImageTransformer<C>,
    config: WorkerConfig,
}

impl<S, F, H, C> Normalizer<S, F, H, C>
where
    S: BlockStore,
    F: OriginFetcher,
    H: ImageHost,
    C: ImageCodec,
{
    pub fn new(store: S, fetcher: F, host: H, codec: C, config: WorkerConfig) -> Self {
        let transformer = ImageTransformer::new(codec, config.target_width);
        Self {
            store,
            fetcher,
            host,
            transformer,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one batch. Only store failures are returned as errors; per-block
    /// failures are recorded on the blocks.
    pub async fn run(&mut self) -> anyhow::Result<RunReport> {
        let query = EligibleQuery {
            limit: self.config.batch_size,
            retry: self.config.retry,
        };
        let blocks = self
            .store
            .eligible(&query)
            .context("Failed to select blocks for normalization")?;

        let mut report = RunReport {
            selected: blocks.len(),
            ..RunReport::default()
        };
        if blocks.is_empty() {
            info!("No blocks pending normalization");
            return Ok(report);
        }

        info!(
            selected = report.selected,
            batch_size = self.config.batch_size,
            "Normalizing blocks"
        );

        let mut changes = ChangeSet::new();
        for mut block in blocks {
            let outcome = self.process(&block).await;
            let now = Utc::now();

            match outcome {
                Outcome::Done(media) => {
                    info!(
                        block_id = block.id,
                        url = %media.url,
                        width = media.width,
                        height = media.height,
                        "Block normalized"
                    );
                    block.mark_normalized(&media.url, media.width, media.height, now);
                    report.done += 1;
                }
                Outcome::Failed(error) => {
                    warn!(
                        block_id = block.id,
                        origin = ?block.origin,
                        error = %error,
                        "Block normalization failed"
                    );
                    block.mark_failed(error, now);
                    report.failed += 1;
                }
            }

            changes.stage(block);
        }

        report.committed = self
            .store
            .commit(changes)
            .context("Failed to commit normalized blocks")?;

        if report.done == 0 {
            warn!(
                selected = report.selected,
                failed = report.failed,
                "Normalization run finished without a single success"
            );
        } else {
            info!(
                done = report.done,
                failed = report.failed,
                committed = report.committed,
                "Normalization run finished"
            );
        }

        Ok(report)
    }

    /// Normalize a single block without touching the store.
    pub async fn process(&self, block: &Block) -> Outcome {
        let Some(url) = block.origin.as_deref().and_then(parse_origin) else {
            return Outcome::Failed(INVALID_ORIGIN.to_string());
        };

        let asset = match self.fetcher.fetch(&url).await {
            Ok(asset) if asset.is_success() => asset,
            Ok(asset) => {
                debug!(block_id = block.id, status = asset.status, "Origin returned an error status");
                return Outcome::Failed(asset.body_text());
            }
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        let mut body = Cursor::new(asset.body.as_ref());
        let content_type = match media::sniff(asset.content_type.as_deref(), &mut body) {
            Ok(content_type) => content_type,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        if !media::is_image(&content_type) {
            debug!(block_id = block.id, content_type = %content_type, "Origin is not an image");
            return Outcome::Failed(INVALID_CONTENT_TYPE.to_string());
        }

        let transformed = match self.transformer.transform(body.get_ref()) {
            Ok(transformed) => transformed,
            Err(e) => return Outcome::Failed(e.to_string()),
        };

        let file_name = upload_file_name(&block.display_name(), extension_for(transformed.content_type));
        let (width, height) = (transformed.width, transformed.height);

        match self
            .host
            .upload(transformed.bytes, transformed.content_type, &file_name)
            .await
        {
            Ok(hosted) => Outcome::Done(HostedMedia {
                url: hosted.url,
                width,
                height,
            }),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

/// Accept only absolute http(s) URLs with a host.
fn parse_origin(origin: &str) -> Option<Url> {
    let url = Url::parse(origin.trim()).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    (web && url.has_host()).then_some(url)
}

fn extension_for(content_type: &str) -> &str {
    content_type
        .strip_prefix("image/")
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin")
}
