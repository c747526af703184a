//! mediaproc - media normalization for article blocks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use mediaproc::{
    api::{self, ApiState},
    block::NewBlock,
    fetch::{ReqwestFetcher, DEFAULT_HTTP_TIMEOUT_SECS},
    host::{imgbb::DEFAULT_IMGBB_URL, ImgBbClient, ImgBbConfig},
    media::{WebpCodec, WebpCompression, DEFAULT_TARGET_WIDTH},
    rank,
    store::{BlockStore, RetryPolicy, SqliteStore, DEFAULT_BATCH_SIZE},
    worker::{Normalizer, WorkerConfig},
};

/// Normalizes article block media and re-hosts it.
#[derive(Parser)]
#[command(name = "mediaproc", about = "Media normalization for article blocks")]
struct Cli {
    /// SQLite database holding the article blocks.
    #[arg(long, global = true, env = "MEDIAPROC_DB", default_value = "mediaproc.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize one batch of pending blocks (the scheduled job).
    Run {
        /// Image host API base URL.
        #[arg(long, env = "IMGBB_URL", default_value = DEFAULT_IMGBB_URL)]
        imgbb_url: String,

        /// Image host API key.
        #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true, default_value = "")]
        imgbb_api_key: String,

        /// Output width in pixels.
        #[arg(long, env = "MEDIAPROC_TARGET_WIDTH", default_value_t = DEFAULT_TARGET_WIDTH)]
        target_width: u32,

        /// Maximum number of blocks per run.
        #[arg(long, env = "MEDIAPROC_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Stop selecting blocks after this many failed attempts (default: retry forever).
        #[arg(long, env = "MEDIAPROC_MAX_ATTEMPTS")]
        max_attempts: Option<u32>,

        /// Lossy WebP quality (0-100).
        #[arg(long, env = "MEDIAPROC_WEBP_QUALITY", default_value_t = 85.0)]
        webp_quality: f32,

        /// Encode lossless WebP instead.
        #[arg(long)]
        lossless: bool,

        /// Timeout for origin downloads and uploads.
        #[arg(long, env = "MEDIAPROC_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
        http_timeout_secs: u64,
    },

    /// Start the read-only REST API.
    Serve {
        /// Address to bind the API server.
        #[arg(long, env = "MEDIAPROC_BIND", default_value = "0.0.0.0:7878")]
        bind: String,
    },

    /// Append a block to an article.
    AddBlock {
        /// Article the block belongs to.
        #[arg(long)]
        article: Uuid,

        /// Absolute URL of the raw asset.
        #[arg(long)]
        origin: Option<String>,

        #[arg(long)]
        title: Option<String>,

        /// Display name, used as alt text.
        #[arg(long)]
        file_name: Option<String>,
    },

    /// Print a rank key that sorts between two keys.
    Rank {
        /// Lower bound (empty = none).
        #[arg(long, default_value = "")]
        prev: String,

        /// Upper bound (empty = none).
        #[arg(long, default_value = "")]
        next: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediaproc=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            imgbb_url,
            imgbb_api_key,
            target_width,
            batch_size,
            max_attempts,
            webp_quality,
            lossless,
            http_timeout_secs,
        } => {
            let compression = if lossless {
                WebpCompression::Lossless
            } else {
                WebpCompression::Lossy(webp_quality)
            };
            let config = WorkerConfig {
                target_width,
                batch_size,
                retry: RetryPolicy::from_limit(max_attempts),
                compression,
            };
            let host = ImgBbConfig {
                base_url: imgbb_url,
                api_key: imgbb_api_key,
            };
            run_batch(&cli.db, config, host, Duration::from_secs(http_timeout_secs)).await?;
        }

        Commands::Serve { bind } => {
            let store = SqliteStore::open(&cli.db)?;
            let state = Arc::new(ApiState::new(Box::new(store)));
            api::serve(state, &bind).await?;
        }

        Commands::AddBlock {
            article,
            origin,
            title,
            file_name,
        } => {
            let mut store = SqliteStore::open(&cli.db)?;
            let block = store.insert(NewBlock {
                article_id: article,
                title,
                description: None,
                origin,
                file_name,
            })?;

            println!("Block added");
            println!("ID:      {}", block.id);
            println!("Article: {}", block.article_id);
            println!("Rank:    {}", block.rank);
            println!("Status:  {:?}", block.status());
        }

        Commands::Rank { prev, next } => {
            println!("{}", rank::between(&prev, &next)?);
        }
    }

    Ok(())
}

/// Run one normalization batch against the SQLite store.
async fn run_batch(
    db: &std::path::Path,
    config: WorkerConfig,
    host: ImgBbConfig,
    timeout: Duration,
) -> Result<()> {
    tracing::info!(config = ?config, host = ?host, "Starting normalization run");

    let store = SqliteStore::open(db)?;
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let codec = WebpCodec::new(config.compression);
    let mut normalizer = Normalizer::new(
        store,
        ReqwestFetcher::new(client.clone()),
        ImgBbClient::new(client, host),
        codec,
        config,
    );

    let report = normalizer.run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
