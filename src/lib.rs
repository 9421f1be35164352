//! Podium - Cache-Resident Ranking Engine
//!
//! Leaderboard engine for the student engagement platform. Scores live in an
//! authoritative Score Store owned by the surrounding system; Podium mirrors
//! them into an in-memory ranking index with per-entity display snapshots
//! and a TTL-bound page cache, and keeps that mirror in step through Update
//! and Rebuild.
//!
//! # Architecture
//!
//! ```text
//! Score Store ──Update/Rebuild──▶ Cache Tier ──Get Page──▶ callers
//!      ▲                          (index, snapshots, pages)
//!      └────── Rank fallback ◀── Rank Resolver
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory Score Store and event publishers
//! - [`domain`] - Ports and domain events (DDD)
//! - [`engine`] - Get Page, Update, Rebuild and Rank Of
//! - [`error`] - Error types
//! - [`ranking`] - Ranking index, snapshot cache, page cache and metrics
//! - [`server`] - HTTP surface

pub mod adapters;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ranking;
pub mod server;

// Re-export commonly used types
pub use domain::{DomainEvent, EntityId, ScoreRecord, ScoreStore};
pub use engine::{
    EngineConfig, LeaderboardEngine, PageResponse, RankResolution, RebuildOptions, RebuildReport,
    ScoreChangeNotifier, UpdateSummary,
};
pub use error::{Error, Result};
pub use ranking::{CacheTier, LeaderboardPage, LeaderboardRow, Pagination};
