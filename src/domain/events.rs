//! Domain Events
//!
//! Immutable records of things that happened to the ranking state. They feed
//! audit logs and let other parts of the platform react to leaderboard
//! changes without coupling to the engine.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::score_updated(&entity_id, 350, Some(1));
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::EntityId;

/// Why the page cache was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    Update,
    Rebuild,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Update => write!(f, "update"),
            InvalidationReason::Rebuild => write!(f, "rebuild"),
        }
    }
}

/// Domain event representing a significant occurrence in the ranking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Score Events
    // =========================================================================
    /// An entity's score was propagated into the ranking index.
    ScoreUpdated {
        entity_id: String,
        score: u64,
        rank: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// A rank was answered from the Score Store instead of the index.
    RankFallbackUsed {
        entity_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Cache Events
    // =========================================================================
    /// Every cached page was dropped.
    PageCacheInvalidated {
        reason: InvalidationReason,
        dropped_pages: usize,
        epoch: u64,
        timestamp: DateTime<Utc>,
    },

    /// The cache tier accepted traffic.
    TierOpened { timestamp: DateTime<Utc> },

    /// The cache tier stopped accepting traffic.
    TierClosed { timestamp: DateTime<Utc> },

    // =========================================================================
    // Rebuild Events
    // =========================================================================
    /// A rebuild began.
    RebuildStarted {
        rebuild_id: String,
        resume: bool,
        timestamp: DateTime<Utc>,
    },

    /// A rebuild finished, possibly cancelled part-way.
    RebuildCompleted {
        rebuild_id: String,
        processed: usize,
        added: usize,
        skipped: usize,
        failed: usize,
        cancelled: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Event type name, used for filtering and log fields.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ScoreUpdated { .. } => "ScoreUpdated",
            DomainEvent::RankFallbackUsed { .. } => "RankFallbackUsed",
            DomainEvent::PageCacheInvalidated { .. } => "PageCacheInvalidated",
            DomainEvent::TierOpened { .. } => "TierOpened",
            DomainEvent::TierClosed { .. } => "TierClosed",
            DomainEvent::RebuildStarted { .. } => "RebuildStarted",
            DomainEvent::RebuildCompleted { .. } => "RebuildCompleted",
        }
    }

    /// When the event happened.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::ScoreUpdated { timestamp, .. }
            | DomainEvent::RankFallbackUsed { timestamp, .. }
            | DomainEvent::PageCacheInvalidated { timestamp, .. }
            | DomainEvent::TierOpened { timestamp }
            | DomainEvent::TierClosed { timestamp }
            | DomainEvent::RebuildStarted { timestamp, .. }
            | DomainEvent::RebuildCompleted { timestamp, .. } => *timestamp,
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    pub fn score_updated(entity_id: &EntityId, score: u64, rank: Option<u64>) -> Self {
        DomainEvent::ScoreUpdated {
            entity_id: entity_id.to_string(),
            score,
            rank,
            timestamp: Utc::now(),
        }
    }

    pub fn rank_fallback_used(entity_id: &EntityId, reason: impl Into<String>) -> Self {
        DomainEvent::RankFallbackUsed {
            entity_id: entity_id.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn page_cache_invalidated(reason: InvalidationReason, dropped_pages: usize, epoch: u64) -> Self {
        DomainEvent::PageCacheInvalidated {
            reason,
            dropped_pages,
            epoch,
            timestamp: Utc::now(),
        }
    }

    pub fn tier_opened() -> Self {
        DomainEvent::TierOpened {
            timestamp: Utc::now(),
        }
    }

    pub fn tier_closed() -> Self {
        DomainEvent::TierClosed {
            timestamp: Utc::now(),
        }
    }

    pub fn rebuild_started(rebuild_id: impl Into<String>, resume: bool) -> Self {
        DomainEvent::RebuildStarted {
            rebuild_id: rebuild_id.into(),
            resume,
            timestamp: Utc::now(),
        }
    }
}
