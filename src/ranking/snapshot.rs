//! Entity Snapshot Cache
//!
//! Denormalized display metadata stored next to the ranking index so page
//! assembly never goes back to the Score Store. Written by Update and
//! Rebuild, read by Get Page.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::domain::ports::{EntityId, ScoreRecord};

/// Display fields mirrored from a [`ScoreRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub display_name: String,
    pub contact_address: String,
    pub badge_count: u64,
    pub item_count: u64,
    pub avatar_ref: Option<String>,
}

impl From<&ScoreRecord> for EntitySnapshot {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            contact_address: record.contact_address.clone(),
            badge_count: record.badge_count,
            item_count: record.item_count,
            avatar_ref: record.avatar_ref.clone(),
        }
    }
}

/// Per-entity snapshot store.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: DashMap<EntityId, EntitySnapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a snapshot
    pub fn put(&self, entity_id: EntityId, snapshot: EntitySnapshot) {
        self.entries.insert(entity_id, snapshot);
    }

    /// Get a snapshot copy
    pub fn get(&self, entity_id: &EntityId) -> Option<EntitySnapshot> {
        self.entries.get(entity_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
