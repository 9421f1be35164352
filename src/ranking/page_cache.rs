//! Page Cache
//!
//! Memoizes assembled leaderboard pages keyed by `(page, page_size)`.
//!
//! # Design
//!
//! - Entries expire after a fixed TTL and are removed lazily on lookup
//! - Every entry is tagged with the invalidation epoch it was computed in
//! - `invalidate_all` bumps the epoch and drops every key; lookups treat
//!   entries from an older epoch as misses, so a page assembled before an
//!   update can never be served after that update returned

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::page::{LeaderboardPage, PageKey};

#[derive(Debug, Clone)]
struct CachedPage {
    page: Arc<LeaderboardPage>,
    expires_at: Instant,
    epoch: u64,
}

impl CachedPage {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.is_expired()
    }
}

/// Result of dropping the whole cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    /// Pages dropped
    pub dropped: usize,
    /// Epoch now in force
    pub epoch: u64,
}

/// TTL-bound page cache with bulk invalidation.
#[derive(Debug, Default)]
pub struct PageCache {
    entries: DashMap<PageKey, CachedPage>,
    epoch: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current invalidation epoch.
    ///
    /// Callers capture this before assembling a page and hand it to `put`.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Get a live page
    pub fn get(&self, key: &PageKey) -> Option<Arc<LeaderboardPage>> {
        let epoch = self.epoch();

        let (page, stale) = match self.entries.get(key) {
            Some(entry) if entry.is_live(epoch) => (Some(Arc::clone(&entry.page)), false),
            Some(_) => (None, true),
            None => (None, false),
        };

        if stale {
            self.entries
                .remove_if(key, |_, entry| !entry.is_live(epoch));
        }

        match page {
            Some(page) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a page computed during `epoch`.
    ///
    /// Returns `false` when an invalidation happened since `epoch` was read;
    /// the page is then not kept.
    pub fn put(&self, key: PageKey, page: Arc<LeaderboardPage>, ttl: Duration, epoch: u64) -> bool {
        if self.epoch() != epoch {
            return false;
        }

        self.entries.insert(
            key,
            CachedPage {
                page,
                expires_at: Instant::now() + ttl,
                epoch,
            },
        );

        // An invalidation may have landed between the check and the insert.
        if self.epoch() != epoch {
            self.entries.remove_if(&key, |_, entry| entry.epoch == epoch);
            return false;
        }

        true
    }

    /// Drop every cached page and start a new epoch.
    pub fn invalidate_all(&self) -> Invalidation {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let dropped = self.entries.len();
        self.entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);

        Invalidation { dropped, epoch }
    }

    /// Remove expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let epoch = self.epoch();
        self.entries.retain(|_, entry| entry.is_live(epoch));
        before.saturating_sub(self.entries.len())
    }

    /// Get number of stored pages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get invalidation count
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Get hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
