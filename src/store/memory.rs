//! In-process block store, used by tests and dry runs.

use chrono::Utc;
use uuid::Uuid;

use super::{BlockStore, ChangeSet, EligibleQuery, Result, RetryPolicy, StoreError};
use crate::block::{Block, NewBlock};
use crate::rank;

/// Block store backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Vec<Block>,
    next_id: i64,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with ready-made blocks, keeping their ids.
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        let next_id = blocks.iter().map(|b| b.id).max().unwrap_or(0);
        Self {
            blocks,
            next_id,
            commits: 0,
        }
    }

    /// Number of successful commit calls.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl BlockStore for MemoryStore {
    fn eligible(&self, query: &EligibleQuery) -> Result<Vec<Block>> {
        let mut selected: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        selected.truncate(query.limit);
        Ok(selected)
    }

    fn count_eligible(&self, retry: RetryPolicy) -> Result<usize> {
        Ok(self
            .blocks
            .iter()
            .filter(|b| b.is_eligible() && retry.allows(b.media_attempts))
            .count())
    }

    fn get(&self, id: i64) -> Result<Option<Block>> {
        Ok(self.blocks.iter().find(|b| b.id == id).cloned())
    }

    fn article_blocks(&self, article_id: &Uuid) -> Result<Vec<Block>> {
        let mut blocks: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| &b.article_id == article_id)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| a.rank.cmp(&b.rank));
        Ok(blocks)
    }

    fn insert(&mut self, block: NewBlock) -> Result<Block> {
        let last_rank = self
            .blocks
            .iter()
            .filter(|b| b.article_id == block.article_id)
            .map(|b| b.rank.as_str())
            .max()
            .unwrap_or("");
        let rank = rank::after(last_rank)?;

        self.next_id += 1;
        let now = Utc::now();
        let stored = Block {
            id: self.next_id,
            article_id: block.article_id,
            title: block.title,
            description: block.description,
            origin: block.origin,
            source_url: None,
            media_error: None,
            width: None,
            height: None,
            file_name: block.file_name,
            rank,
            media_attempts: 0,
            created_at: now,
            updated_at: now,
        };
        self.blocks.push(stored.clone());
        Ok(stored)
    }

    fn commit(&mut self, changes: ChangeSet) -> Result<usize> {
        let mut positions = Vec::with_capacity(changes.len());
        for block in changes.blocks() {
            let pos = self
                .blocks
                .iter()
                .position(|b| b.id == block.id)
                .ok_or(StoreError::BlockNotFound(block.id))?;
            positions.push(pos);
        }

        let count = positions.len();
        for (pos, block) in positions.into_iter().zip(changes.into_blocks()) {
            self.blocks[pos] = block;
        }
        self.commits += 1;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::record::tests::pending_block;

    #[test]
    fn test_eligible_newest_first_and_capped() {
        let base = Utc::now();
        let blocks = (1..=12)
            .map(|i| {
                let mut b = pending_block(i, "https://host/a.png");
                b.created_at = base + chrono::Duration::seconds(i);
                b
            })
            .collect();
        let store = MemoryStore::with_blocks(blocks);

        let selected = store.eligible(&EligibleQuery::default()).unwrap();
        let ids: Vec<i64> = selected.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![12, 11, 10, 9, 8, 7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_eligible_respects_retry_policy() {
        let mut tired = pending_block(1, "https://host/a.png");
        tired.media_attempts = 3;
        let fresh = pending_block(2, "https://host/b.png");
        let store = MemoryStore::with_blocks(vec![tired, fresh]);

        let forever = store.eligible(&EligibleQuery::default()).unwrap();
        assert_eq!(forever.len(), 2);

        let capped = store
            .eligible(&EligibleQuery {
                limit: 10,
                retry: RetryPolicy::MaxAttempts(3),
            })
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, 2);

        assert_eq!(store.count_eligible(RetryPolicy::Forever).unwrap(), 2);
        assert_eq!(store.count_eligible(RetryPolicy::MaxAttempts(3)).unwrap(), 1);
    }

    #[test]
    fn test_count_eligible_ignores_batch_size() {
        let blocks = (1..=25).map(|i| pending_block(i, "https://host/a.png")).collect();
        let store = MemoryStore::with_blocks(blocks);
        assert_eq!(store.eligible(&EligibleQuery::default()).unwrap().len(), 10);
        assert_eq!(store.count_eligible(RetryPolicy::Forever).unwrap(), 25);
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let mut store = MemoryStore::with_blocks(vec![pending_block(1, "https://host/a.png")]);

        let mut changes = ChangeSet::new();
        let mut known = store.get(1).unwrap().unwrap();
        known.media_error = Some("invalid-origin".to_string());
        changes.stage(known);
        changes.stage(pending_block(99, "https://host/ghost.png"));

        assert!(matches!(store.commit(changes), Err(StoreError::BlockNotFound(99))));
        assert!(store.get(1).unwrap().unwrap().media_error.is_none());
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_insert_appends_rank() {
        let mut store = MemoryStore::new();
        let article = Uuid::new_v4();
        for i in 0..5 {
            store
                .insert(NewBlock {
                    article_id: article,
                    origin: Some(format!("https://host/{i}.png")),
                    ..Default::default()
                })
                .unwrap();
        }

        let blocks = store.article_blocks(&article).unwrap();
        let ids: Vec<i64> = blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(blocks[0].rank, "n");
    }
}
