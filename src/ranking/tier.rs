//! Cache Tier
//!
//! Owns the ranking index, the snapshot cache and the page cache, and gates
//! access to them behind an Open/Close lifecycle. While the tier is closed
//! every accessor reports `CacheUnavailable`, which is how callers observe a
//! cache outage.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::index::RankingIndex;
use super::page_cache::{Invalidation, PageCache};
use super::snapshot::SnapshotCache;
use crate::error::{Error, Result};

/// Point-in-time view of the tier, readable while closed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub available: bool,
    pub index_entries: usize,
    pub snapshots: usize,
    pub cached_pages: usize,
    pub page_cache_hits: u64,
    pub page_cache_misses: u64,
    pub page_cache_hit_ratio: f64,
    pub page_cache_epoch: u64,
    pub last_rebuild: Option<DateTime<Utc>>,
}

/// The cache-resident ranking state shared by every request.
#[derive(Debug, Default)]
pub struct CacheTier {
    index: RankingIndex,
    snapshots: SnapshotCache,
    pages: PageCache,
    open: AtomicBool,
    last_rebuild: RwLock<Option<DateTime<Utc>>>,
}

impl CacheTier {
    /// Create a closed, empty tier
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting traffic. Returns `true` if the tier was closed.
    pub fn open(&self) -> bool {
        !self.open.swap(true, Ordering::SeqCst)
    }

    /// Stop accepting traffic. Contents are kept for a later `open`.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::CacheUnavailable("cache tier is closed".into()))
        }
    }

    /// Ranking index, if the tier is reachable
    pub fn index(&self) -> Result<&RankingIndex> {
        self.ensure_open()?;
        Ok(&self.index)
    }

    /// Snapshot cache, if the tier is reachable
    pub fn snapshots(&self) -> Result<&SnapshotCache> {
        self.ensure_open()?;
        Ok(&self.snapshots)
    }

    /// Page cache, if the tier is reachable
    pub fn pages(&self) -> Result<&PageCache> {
        self.ensure_open()?;
        Ok(&self.pages)
    }

    /// Drop every cached page, open or not.
    pub(crate) fn invalidate_pages(&self) -> Invalidation {
        self.pages.invalidate_all()
    }

    /// Record a completed rebuild
    pub fn mark_rebuilt(&self) {
        *self.last_rebuild.write() = Some(Utc::now());
    }

    pub fn last_rebuild(&self) -> Option<DateTime<Utc>> {
        *self.last_rebuild.read()
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            available: self.is_open(),
            index_entries: self.index.len(),
            snapshots: self.snapshots.len(),
            cached_pages: self.pages.len(),
            page_cache_hits: self.pages.hits(),
            page_cache_misses: self.pages.misses(),
            page_cache_hit_ratio: self.pages.hit_ratio(),
            page_cache_epoch: self.pages.epoch(),
            last_rebuild: self.last_rebuild(),
        }
    }
}
