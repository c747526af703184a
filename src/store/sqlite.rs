//! SQLite-backed block store.

use std::path::Path;

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{BlockStore, ChangeSet, EligibleQuery, Result, RetryPolicy, StoreError};
use crate::block::{Block, NewBlock};
use crate::rank;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS article_blocks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id     TEXT    NOT NULL,
    title          TEXT,
    description    TEXT,
    origin         TEXT,
    source_url     TEXT,
    media_error    TEXT,
    width          INTEGER,
    height         INTEGER,
    file_name      TEXT,
    rank           TEXT    NOT NULL,
    media_attempts INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT    NOT NULL,
    updated_at     TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_article_blocks_pending
    ON article_blocks (created_at)
    WHERE source_url IS NULL AND origin IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_article_blocks_rank
    ON article_blocks (article_id, rank);
"#;

const COLUMNS: &str = "id, article_id, title, description, origin, source_url, media_error, \
                       width, height, file_name, rank, media_attempts, created_at, updated_at";

/// Block store persisted in a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened block store");
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn query_blocks<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Block>> {
        let mut stmt = self.conn.prepare(sql)?;
        let blocks = stmt
            .query_map(params, block_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(blocks)
    }
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    let article_id: String = row.get(1)?;
    let article_id = Uuid::parse_str(&article_id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(Block {
        id: row.get(0)?,
        article_id,
        title: row.get(2)?,
        description: row.get(3)?,
        origin: row.get(4)?,
        source_url: row.get(5)?,
        media_error: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        file_name: row.get(9)?,
        rank: row.get(10)?,
        media_attempts: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl BlockStore for SqliteStore {
    fn eligible(&self, query: &EligibleQuery) -> Result<Vec<Block>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM article_blocks \
             WHERE source_url IS NULL AND origin IS NOT NULL \
               AND (?1 IS NULL OR media_attempts < ?1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT ?2"
        );
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        self.query_blocks(&sql, params![query.retry.limit(), limit])
    }

    fn count_eligible(&self, retry: RetryPolicy) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM article_blocks \
             WHERE source_url IS NULL AND origin IS NOT NULL \
               AND (?1 IS NULL OR media_attempts < ?1)",
            params![retry.limit()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn get(&self, id: i64) -> Result<Option<Block>> {
        let sql = format!("SELECT {COLUMNS} FROM article_blocks WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], block_from_row)
            .optional()?)
    }

    fn article_blocks(&self, article_id: &Uuid) -> Result<Vec<Block>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM article_blocks WHERE article_id = ?1 ORDER BY rank ASC, id ASC"
        );
        self.query_blocks(&sql, params![article_id.to_string()])
    }

    fn insert(&mut self, block: NewBlock) -> Result<Block> {
        let tx = self.conn.transaction()?;

        let last_rank: Option<String> = tx
            .query_row(
                "SELECT rank FROM article_blocks WHERE article_id = ?1 ORDER BY rank DESC LIMIT 1",
                params![block.article_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let rank = rank::after(last_rank.as_deref().unwrap_or(""))?;

        let now = Utc::now();
        tx.execute(
            "INSERT INTO article_blocks \
             (article_id, title, description, origin, file_name, rank, media_attempts, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
            params![
                block.article_id.to_string(),
                block.title,
                block.description,
                block.origin,
                block.file_name,
                rank,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(block_id = id, rank = %rank, "Inserted block");

        self.get(id)?.ok_or(StoreError::BlockNotFound(id))
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;

        {
            let mut stmt = tx.prepare(
                "UPDATE article_blocks SET \
                 title = ?2, description = ?3, origin = ?4, source_url = ?5, media_error = ?6, \
                 width = ?7, height = ?8, file_name = ?9, rank = ?10, media_attempts = ?11, \
                 updated_at = ?12 \
                 WHERE id = ?1",
            )?;

            for block in changes.blocks() {
                let updated = stmt.execute(params![
                    block.id,
                    block.title,
                    block.description,
                    block.origin,
                    block.source_url,
                    block.media_error,
                    block.width,
                    block.height,
                    block.file_name,
                    block.rank,
                    block.media_attempts,
                    block.updated_at,
                ])?;
                if updated == 0 {
                    // tx is rolled back on drop
                    return Err(StoreError::BlockNotFound(block.id));
                }
                written += updated;
            }
        }

        tx.commit()?;
        debug!(written = written, "Committed change set");
        Ok(written)
    }
}
