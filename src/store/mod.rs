//! Block record store.
//!
//! The normalizer talks to storage through [`BlockStore`]:
//! - read a bounded batch of eligible blocks, newest first
//! - collect every mutation of a run in a [`ChangeSet`]
//! - flush the change-set with one transactional [`BlockStore::commit`]
//!
//! A crash between the reads and the commit loses the whole batch's progress.
//! The next run simply picks the same blocks up again.

pub mod memory;
pub mod sqlite;

use thiserror::Error;
use uuid::Uuid;

use crate::block::{Block, NewBlock};
use crate::rank::RankError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Number of blocks normalized per run.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors that can occur in store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Block not found: {0}")]
    BlockNotFound(i64),

    #[error("Rank error: {0}")]
    Rank(#[from] RankError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Whether blocks that keep failing stay eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Every block without a hosted URL is retried on every run, so fixing a
    /// broken origin heals the block without further intervention.
    #[default]
    Forever,

    /// Blocks with this many failed attempts are no longer selected.
    MaxAttempts(u32),
}

impl RetryPolicy {
    /// Build from an optional attempt limit (`None` = retry forever).
    pub fn from_limit(limit: Option<u32>) -> Self {
        limit.map_or(Self::Forever, Self::MaxAttempts)
    }

    /// Whether a block with `attempts` failures may be selected again.
    pub fn allows(&self, attempts: u32) -> bool {
        match self {
            Self::Forever => true,
            Self::MaxAttempts(max) => attempts < *max,
        }
    }

    fn limit(&self) -> Option<u32> {
        match self {
            Self::Forever => None,
            Self::MaxAttempts(max) => Some(*max),
        }
    }
}

/// Selection of blocks for one normalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibleQuery {
    pub limit: usize,
    pub retry: RetryPolicy,
}

impl Default for EligibleQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::Forever,
        }
    }
}

impl EligibleQuery {
    /// In-memory form of the eligibility predicate.
    pub fn matches(&self, block: &Block) -> bool {
        block.is_eligible() && self.retry.allows(block.media_attempts)
    }
}

/// Mutations staged during a run and written together.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    staged: Vec<Block>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a block. Staging the same id twice keeps the latest version.
    pub fn stage(&mut self, block: Block) {
        match self.staged.iter_mut().find(|b| b.id == block.id) {
            Some(existing) => *existing = block,
            None => self.staged.push(block),
        }
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.staged
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.staged
    }
}

/// Storage of article blocks.
pub trait BlockStore: Send {
    /// Blocks eligible for normalization, newest `created_at` first.
    fn eligible(&self, query: &EligibleQuery) -> Result<Vec<Block>>;

    /// Number of blocks `eligible` would select with no limit.
    fn count_eligible(&self, retry: RetryPolicy) -> Result<usize>;

    fn get(&self, id: i64) -> Result<Option<Block>>;

    /// Blocks of one article in display (rank) order.
    fn article_blocks(&self, article_id: &Uuid) -> Result<Vec<Block>>;

    /// Create a block ranked after the article's current last block.
    fn insert(&mut self, block: NewBlock) -> Result<Block>;

    /// Write every staged block atomically. Returns the number of blocks
    /// written. Nothing is written if any staged block is unknown.
    fn commit(&mut self, changes: ChangeSet) -> Result<usize>;
}
