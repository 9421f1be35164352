//! Cache-Resident Ranking State
//!
//! The denormalized side of the leaderboard: everything here mirrors the
//! Score Store and can be rebuilt from it at any time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            Cache Tier                                     │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Ranking Index          │ Snapshot Cache        │ Page Cache              │
//! │  ┌──────────────────┐   │ ┌─────────────────┐   │ ┌────────────────────┐  │
//! │  │ sorted Vec       │   │ │ DashMap         │   │ │ DashMap + TTL      │  │
//! │  │ + score HashMap  │   │ │ id → display    │   │ │ + invalidation     │  │
//! │  │ (score desc, id) │   │ │   fields        │   │ │   epoch            │  │
//! │  └──────────────────┘   │ └─────────────────┘   │ └────────────────────┘  │
//! │                                                                           │
//! │                   Open / Close lifecycle (availability gate)              │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only Update and Rebuild write the index and snapshots. Get Page only
//! inserts into the page cache.

pub mod index;
pub mod metrics;
pub mod page;
pub mod page_cache;
pub mod snapshot;
pub mod tier;

#[cfg(test)]
mod proptest;

pub use index::{RankedEntry, RankingIndex, UpsertOutcome};
pub use metrics::EngineMetrics;
pub use page::{LeaderboardPage, LeaderboardRow, PageKey, PageQuery, Pagination};
pub use page_cache::{Invalidation, PageCache};
pub use snapshot::{EntitySnapshot, SnapshotCache};
pub use tier::{CacheTier, TierStats};

/// Default time-to-live for cached pages (5 minutes)
pub const DEFAULT_PAGE_TTL_SECS: u64 = 300;

/// Default upper bound for a page size
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// Default page size when the caller gives none
pub const DEFAULT_PAGE_SIZE: u64 = 10;
