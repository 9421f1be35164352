//! Leaderboard page types
//!
//! Typed rows and pagination metadata for assembled pages. A row whose
//! snapshot is missing keeps its rank and score and leaves every display
//! field as `None`.

use serde::Serialize;

use super::index::RankedEntry;
use super::snapshot::EntitySnapshot;
use crate::domain::ports::EntityId;
use crate::error::{Error, Result};

/// Page cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub page: u64,
    pub page_size: u64,
}

/// Validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    page: u64,
    limit: u64,
}

impl PageQuery {
    /// Validate `page >= 1` and `1 <= limit <= max_page_size`.
    pub fn new(page: u64, limit: u64, max_page_size: u64) -> Result<Self> {
        if page == 0 {
            return Err(Error::Validation("page must be at least 1".into()));
        }
        if limit == 0 {
            return Err(Error::Validation("limit must be at least 1".into()));
        }
        if limit > max_page_size {
            return Err(Error::Validation(format!(
                "limit must not exceed {}",
                max_page_size
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// 0-based index offset of the first row, saturating on overflow.
    pub fn offset(&self) -> usize {
        let offset = (self.page - 1).saturating_mul(self.limit);
        usize::try_from(offset).unwrap_or(usize::MAX)
    }

    pub fn key(&self) -> PageKey {
        PageKey {
            page: self.page,
            page_size: self.limit,
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u64,
    pub entity_id: EntityId,
    pub score: u64,
    pub display_name: Option<String>,
    pub badge_count: Option<u64>,
    pub item_count: Option<u64>,
    pub avatar_ref: Option<String>,
}

impl LeaderboardRow {
    /// Join an index entry with its snapshot, if any.
    pub fn assemble(entry: RankedEntry, snapshot: Option<EntitySnapshot>) -> Self {
        match snapshot {
            Some(snapshot) => Self {
                rank: entry.rank,
                entity_id: entry.entity_id,
                score: entry.score,
                display_name: Some(snapshot.display_name),
                badge_count: Some(snapshot.badge_count),
                item_count: Some(snapshot.item_count),
                avatar_ref: snapshot.avatar_ref,
            },
            None => Self {
                rank: entry.rank,
                entity_id: entry.entity_id,
                score: entry.score,
                display_name: None,
                badge_count: None,
                item_count: None,
                avatar_ref: None,
            },
        }
    }

    /// Whether the display fields came from a snapshot
    pub fn has_snapshot(&self) -> bool {
        self.display_name.is_some()
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(total_items: u64, query: &PageQuery) -> Self {
        Self {
            total_items,
            total_pages: total_items.div_ceil(query.limit()),
            current_page: query.page(),
            limit: query.limit(),
        }
    }
}

/// A fully assembled page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub rows: Vec<LeaderboardRow>,
    pub pagination: Pagination,
}

impl LeaderboardPage {
    pub fn new(rows: Vec<LeaderboardRow>, pagination: Pagination) -> Self {
        Self { rows, pagination }
    }

    /// Page for an empty index
    pub fn empty(query: &PageQuery) -> Self {
        Self::new(Vec::new(), Pagination::new(0, query))
    }
}
