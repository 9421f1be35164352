//! Ranking Index
//!
//! Ordered entity → score structure kept fully resident in the cache tier.
//!
//! # Design
//!
//! - Entries are ordered by score descending, ties broken by entity id
//!   ascending, so every entity has exactly one deterministic position
//! - A sorted `Vec` gives O(log n) `rank_of` via binary search and
//!   contiguous O(log n + k) range reads; upserts pay an O(n) memmove
//! - A `HashMap` holds the current score per entity for O(1) lookups
//! - One `RwLock` covers both structures so readers never see them disagree

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::ports::EntityId;

/// Sort key: higher score first, then entity id ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RankKey {
    score: u64,
    entity_id: EntityId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.entity_id.cmp(&other.entity_id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One index entry paired with its 1-based rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub rank: u64,
    pub entity_id: EntityId,
    pub score: u64,
}

/// What an upsert did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Entity was not present before
    Inserted,
    /// Entity moved from `previous` to the new score
    Updated { previous: u64 },
    /// Entity already had this score
    Unchanged,
}

#[derive(Debug, Default)]
struct IndexInner {
    /// Kept sorted by `RankKey` at all times
    sorted: Vec<RankKey>,
    scores: HashMap<EntityId, u64>,
}

/// Ranking index: one entry per entity, ordered by score descending.
#[derive(Debug, Default)]
pub struct RankingIndex {
    inner: RwLock<IndexInner>,
}

impl RankingIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for an entity.
    pub fn upsert(&self, entity_id: &EntityId, score: u64) -> UpsertOutcome {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let outcome = match inner.scores.get(entity_id).copied() {
            Some(previous) if previous == score => return UpsertOutcome::Unchanged,
            Some(previous) => {
                let old = RankKey {
                    score: previous,
                    entity_id: entity_id.clone(),
                };
                if let Ok(idx) = inner.sorted.binary_search(&old) {
                    inner.sorted.remove(idx);
                }
                UpsertOutcome::Updated { previous }
            }
            None => UpsertOutcome::Inserted,
        };

        let key = RankKey {
            score,
            entity_id: entity_id.clone(),
        };
        let idx = inner.sorted.binary_search(&key).unwrap_or_else(|idx| idx);
        inner.sorted.insert(idx, key);
        inner.scores.insert(entity_id.clone(), score);

        outcome
    }

    /// Up to `count` entries starting at 0-based `offset`, best first.
    ///
    /// An offset past the end yields an empty list.
    pub fn range_by_rank(&self, offset: usize, count: usize) -> Vec<RankedEntry> {
        let inner = self.inner.read();
        if offset >= inner.sorted.len() {
            return Vec::new();
        }

        let end = offset.saturating_add(count).min(inner.sorted.len());
        inner.sorted[offset..end]
            .iter()
            .enumerate()
            .map(|(i, key)| RankedEntry {
                rank: (offset + i) as u64 + 1,
                entity_id: key.entity_id.clone(),
                score: key.score,
            })
            .collect()
    }

    /// 0-based position of an entity, `None` when it is unranked.
    pub fn rank_of(&self, entity_id: &EntityId) -> Option<usize> {
        let inner = self.inner.read();
        let score = *inner.scores.get(entity_id)?;
        let key = RankKey {
            score,
            entity_id: entity_id.clone(),
        };
        inner.sorted.binary_search(&key).ok()
    }

    /// Current indexed score of an entity
    pub fn score_of(&self, entity_id: &EntityId) -> Option<u64> {
        self.inner.read().scores.get(entity_id).copied()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.inner.read().sorted.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.sorted.clear();
        inner.scores.clear();
    }

    /// Full ordered copy of the index.
    pub fn entries(&self) -> Vec<RankedEntry> {
        self.range_by_rank(0, usize::MAX)
    }
}

// =============================================================================
// Tests
// =============================================================================
