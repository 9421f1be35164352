//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the abstractions the ranking engine depends on.
//! The surrounding platform owns the concrete Score Store and derived-count
//! queries; adapters in [`crate::adapters`] provide in-memory versions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Ranking Engine                          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  ScoreStore │ DerivedCountProvider │ EventPublisher │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  InMemoryScoreStore │ InMemoryDerivedCounts │ Publishers     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Opaque entity (student) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a caller-supplied id, rejecting empty or blank values.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("entity id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Authoritative score and display metadata, owned by the Score Store.
///
/// `score` is never negative; the surrounding system enforces that and the
/// engine trusts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub entity_id: EntityId,
    pub display_name: String,
    pub contact_address: String,
    pub score: u64,
    #[serde(default)]
    pub badge_count: u64,
    #[serde(default)]
    pub item_count: u64,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

impl ScoreRecord {
    /// Minimal record with empty display fields, mostly for tests.
    pub fn new(entity_id: impl Into<EntityId>, display_name: impl Into<String>, score: u64) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            contact_address: String::new(),
            score,
            badge_count: 0,
            item_count: 0,
            avatar_ref: None,
        }
    }

    pub fn with_counts(mut self, badge_count: u64, item_count: u64) -> Self {
        self.badge_count = badge_count;
        self.item_count = item_count;
        self
    }

    pub fn with_contact(mut self, contact_address: impl Into<String>) -> Self {
        self.contact_address = contact_address.into();
        self
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    /// Copy of the record with freshly computed derived counts.
    pub fn with_derived(mut self, counts: DerivedCounts) -> Self {
        self.badge_count = counts.badge_count;
        self.item_count = counts.item_count;
        self
    }
}

/// Counts derived from related stores (badges earned, projects submitted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedCounts {
    pub badge_count: u64,
    pub item_count: u64,
}

impl DerivedCounts {
    pub fn new(badge_count: u64, item_count: u64) -> Self {
        Self {
            badge_count,
            item_count,
        }
    }
}

// =============================================================================
// Score Store Port
// =============================================================================

/// Stream of score records for a full rebuild.
///
/// Individual items may fail without ending the stream.
pub type ScoreRecordStream = BoxStream<'static, Result<ScoreRecord>>;

/// Port for the authoritative score store.
///
/// The engine only reads through this port. Score arithmetic is applied by
/// the surrounding system before it asks the engine to propagate a change.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Read one record, `None` when the entity does not exist.
    async fn get_score_record(&self, entity_id: &EntityId) -> Result<Option<ScoreRecord>>;

    /// Count records whose score is strictly greater than `score`.
    async fn count_with_score_greater_than(&self, score: u64) -> Result<u64>;

    /// Stream every record in the store.
    async fn stream_all_score_records(&self) -> Result<ScoreRecordStream>;

    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Derived Count Port
// =============================================================================

/// Port for counting related items per entity.
///
/// Treated as a black box: one query per entity or a bulk join behind it.
#[async_trait]
pub trait DerivedCountProvider: Send + Sync {
    /// Current badge and item counts for an entity.
    async fn derived_counts(&self, entity_id: &EntityId) -> Result<DerivedCounts>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

use super::events::DomainEvent;

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================
