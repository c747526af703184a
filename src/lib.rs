//! mediaproc - media normalization for article blocks.
//!
//! Articles are made of ordered blocks. A block that references an external
//! image (`origin`) is normalized by a scheduled batch job:
//!
//! ```text
//! origin URL ──fetch──▶ sniff ──▶ rotate + resize ──▶ WebP ──upload──▶ source_url
//! ```
//!
//! The outcome of every block (hosted URL or error string) is written back
//! in one transactional commit per run. Sibling blocks are ordered by
//! fractional rank keys, so moving a block never renumbers its neighbours.

// === Core ===

/// Article block records.
pub mod block;

/// Fractional rank keys.
pub mod rank;

/// Content sniffing and image transformation.
pub mod media;

/// Batch normalizer.
pub mod worker;

// === Collaborators ===

/// Block persistence.
pub mod store;

/// Origin downloads.
pub mod fetch;

/// Image hosting.
pub mod host;

/// REST API.
pub mod api;

// === Re-exports ===

pub use block::{Block, BlockView, MediaStatus, NewBlock};
pub use rank::{between, RankError};
pub use store::{BlockStore, ChangeSet, MemoryStore, RetryPolicy, SqliteStore};
pub use worker::{Normalizer, Outcome, RunReport, WorkerConfig};
