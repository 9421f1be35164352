//! In-Memory Score Store Adapter
//!
//! Implements the `ScoreStore` and `DerivedCountProvider` ports over process
//! memory. The binary uses it when running standalone from a seed file;
//! tests use its failure-injection knobs to simulate outages and slow
//! stores.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::ports::{
    DerivedCountProvider, DerivedCounts, EntityId, ScoreRecord, ScoreRecordStream, ScoreStore,
};
use crate::error::{Error, Result};

/// On-disk seed format: `{ records: [...] }` in JSON or YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub records: Vec<ScoreRecord>,
}

impl SeedFile {
    /// Parse seed contents; YAML when `yaml` is set, JSON otherwise.
    pub fn parse(contents: &str, yaml: bool) -> Result<Self> {
        if yaml {
            Ok(serde_yaml::from_str(contents)?)
        } else {
            Ok(serde_json::from_str(contents)?)
        }
    }
}

// =============================================================================
// Score Store
// =============================================================================

/// Score Store kept in a `BTreeMap`, so streams come out in entity id order.
#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    records: RwLock<BTreeMap<EntityId, ScoreRecord>>,
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
    failing_stream_items: RwLock<HashSet<usize>>,
    reads: AtomicU64,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ScoreRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    /// Load a seed file, picking the format from its extension.
    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let seed = SeedFile::parse(&contents, yaml)?;
        info!(path = %path.display(), records = seed.records.len(), "Loaded score seed file");
        Ok(Self::with_records(seed.records))
    }

    // =========================================================================
    // Record Management
    // =========================================================================

    /// Insert or replace a record
    pub fn upsert(&self, record: ScoreRecord) {
        self.records.write().insert(record.entity_id.clone(), record);
    }

    /// Set an absolute score. Returns `false` for an unknown entity.
    pub fn set_score(&self, entity_id: &EntityId, score: u64) -> bool {
        match self.records.write().get_mut(entity_id) {
            Some(record) => {
                record.score = score;
                true
            }
            None => false,
        }
    }

    /// Apply a signed delta, saturating at zero. Returns the new score.
    pub fn apply_delta(&self, entity_id: &EntityId, delta: i64) -> Option<u64> {
        let mut records = self.records.write();
        let record = records.get_mut(entity_id)?;
        record.score = if delta >= 0 {
            record.score.saturating_add(delta.unsigned_abs())
        } else {
            record.score.saturating_sub(delta.unsigned_abs())
        };
        Some(record.score)
    }

    pub fn remove(&self, entity_id: &EntityId) -> Option<ScoreRecord> {
        self.records.write().remove(entity_id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Simulate an outage; every call fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }

    /// Yield an error in place of the record at stream `position`
    pub fn fail_stream_item(&self, position: usize) {
        self.failing_stream_items.write().insert(position);
    }

    /// Number of single-record reads served
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    async fn round_trip(&self) -> Result<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::ScoreStore("score store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn get_score_record(&self, entity_id: &EntityId) -> Result<Option<ScoreRecord>> {
        self.round_trip().await?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().get(entity_id).cloned())
    }

    async fn count_with_score_greater_than(&self, score: u64) -> Result<u64> {
        self.round_trip().await?;
        let count = self
            .records
            .read()
            .values()
            .filter(|record| record.score > score)
            .count();
        Ok(count as u64)
    }

    async fn stream_all_score_records(&self) -> Result<ScoreRecordStream> {
        self.round_trip().await?;

        let failing = self.failing_stream_items.read().clone();
        let items: Vec<Result<ScoreRecord>> = self
            .records
            .read()
            .values()
            .enumerate()
            .map(|(position, record)| {
                if failing.contains(&position) {
                    Err(Error::ScoreStore(format!(
                        "failed to decode record at position {}",
                        position
                    )))
                } else {
                    Ok(record.clone())
                }
            })
            .collect();

        debug!(records = items.len(), "Streaming score records");
        Ok(stream::iter(items).boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.round_trip().await.is_ok())
    }
}

// =============================================================================
// Derived Counts
// =============================================================================

/// Derived-count provider backed by a map; unknown entities count zero.
#[derive(Debug, Default)]
pub struct InMemoryDerivedCounts {
    counts: DashMap<EntityId, DerivedCounts>,
    failing: DashSet<EntityId>,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryDerivedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, entity_id: &EntityId, counts: DerivedCounts) {
        self.counts.insert(entity_id.clone(), counts);
    }

    /// Make lookups for `entity_id` fail
    pub fn fail_for(&self, entity_id: &EntityId) {
        self.failing.insert(entity_id.clone());
    }

    pub fn recover(&self, entity_id: &EntityId) {
        self.failing.remove(entity_id);
    }

    /// Delay every lookup by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }
}

#[async_trait]
impl DerivedCountProvider for InMemoryDerivedCounts {
    async fn derived_counts(&self, entity_id: &EntityId) -> Result<DerivedCounts> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.contains(entity_id) {
            return Err(Error::DerivedCounts {
                entity_id: entity_id.to_string(),
                reason: "related-item query failed".into(),
            });
        }

        Ok(self
            .counts
            .get(entity_id)
            .map(|entry| *entry.value())
            .unwrap_or_default())
    }
}
