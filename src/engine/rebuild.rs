//! Rebuild Procedure
//!
//! Repopulates the ranking index and snapshot cache from the Score Store.
//!
//! # Flow
//!
//! ```text
//! stream_all_score_records
//!     │
//!     ▼
//! clear (unless resuming) ──▶ derived counts (bounded concurrency)
//!                                   │
//!                                   ▼
//!                        upsert + snapshot put, one entity at a time
//!                                   │
//!                                   ▼
//!                           invalidate page cache
//! ```
//!
//! Accounting is an explicit per-entity outcome list. A failure on one
//! entity is recorded and skipped. Cancellation stops between entities, so
//! every entry already written stays valid and a later `resume` run can
//! pick up where this one stopped.

use std::time::Instant;

use futures::StreamExt;
use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{DerivedCountProvider, EntityId, ScoreRecord, ScoreStore};
use crate::error::Result;
use crate::ranking::{CacheTier, EntitySnapshot, Invalidation};

/// Options for one rebuild run.
#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Keep existing entries and skip entities already indexed at the
    /// same score
    pub resume: bool,

    /// Stops the run between entities when cancelled
    pub cancel: CancellationToken,
}

impl RebuildOptions {
    /// Options for resuming an interrupted rebuild
    pub fn resume() -> Self {
        Self {
            resume: true,
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What happened to one streamed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum EntityOutcome {
    /// Written to the index and snapshot cache
    #[serde(rename_all = "camelCase")]
    Added { entity_id: EntityId },

    /// Already present at the same score (resume only)
    #[serde(rename_all = "camelCase")]
    Skipped { entity_id: EntityId },

    /// Not written. `entity_id` is absent when the store failed to yield
    /// the record at all.
    #[serde(rename_all = "camelCase")]
    Failed {
        entity_id: Option<EntityId>,
        reason: String,
    },
}

impl EntityOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, EntityOutcome::Failed { .. })
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            EntityOutcome::Added { entity_id } | EntityOutcome::Skipped { entity_id } => {
                Some(entity_id)
            }
            EntityOutcome::Failed { entity_id, .. } => entity_id.as_ref(),
        }
    }
}

/// Summary of a rebuild run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub rebuild_id: Uuid,
    pub processed: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration_ms: u64,

    /// Every per-entity outcome; only failures are serialized
    #[serde(rename = "failures", serialize_with = "serialize_failures")]
    pub outcomes: Vec<EntityOutcome>,
}

impl RebuildReport {
    fn from_outcomes(
        rebuild_id: Uuid,
        outcomes: Vec<EntityOutcome>,
        cancelled: bool,
        started: Instant,
    ) -> Self {
        let mut added = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for outcome in &outcomes {
            match outcome {
                EntityOutcome::Added { .. } => added += 1,
                EntityOutcome::Skipped { .. } => skipped += 1,
                EntityOutcome::Failed { .. } => failed += 1,
            }
        }

        Self {
            rebuild_id,
            processed: outcomes.len(),
            added,
            skipped,
            failed,
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
            outcomes,
        }
    }

    /// Failed outcomes only
    pub fn failures(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

fn serialize_failures<S: Serializer>(
    outcomes: &[EntityOutcome],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(outcomes.iter().filter(|o| o.is_failure()))
}

/// Drops every cached page when a run ends without reaching `complete`.
///
/// Covers `?` exits and a future dropped mid-run (timeout, client
/// disconnect, shutdown), after which the index may be empty or partial.
struct PageInvalidationGuard<'a> {
    tier: &'a CacheTier,
    armed: bool,
}

impl<'a> PageInvalidationGuard<'a> {
    fn new(tier: &'a CacheTier) -> Self {
        Self { tier, armed: true }
    }

    /// Invalidate through the open tier and disarm.
    fn complete(mut self) -> Result<Invalidation> {
        let invalidation = self.tier.pages()?.invalidate_all();
        self.armed = false;
        Ok(invalidation)
    }
}

impl Drop for PageInvalidationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let invalidation = self.tier.invalidate_pages();
            warn!(
                dropped = invalidation.dropped,
                epoch = invalidation.epoch,
                "Rebuild ended early, dropped cached pages"
            );
        }
    }
}

/// One rebuild run over a cache tier.
pub(crate) struct RebuildProcedure<'a> {
    tier: &'a CacheTier,
    store: &'a dyn ScoreStore,
    derived: Option<&'a dyn DerivedCountProvider>,
    concurrency: usize,
}

impl<'a> RebuildProcedure<'a> {
    pub(crate) fn new(
        tier: &'a CacheTier,
        store: &'a dyn ScoreStore,
        derived: Option<&'a dyn DerivedCountProvider>,
        concurrency: usize,
    ) -> Self {
        Self {
            tier,
            store,
            derived,
            concurrency: concurrency.max(1),
        }
    }

    /// Run to completion or cancellation.
    ///
    /// Fails only when the tier becomes unavailable or the store cannot open
    /// its record stream; per-entity problems end up in the report. Every
    /// exit, including an error or a dropped future, drops the cached pages.
    pub(crate) async fn run(
        &self,
        rebuild_id: Uuid,
        options: &RebuildOptions,
    ) -> Result<(RebuildReport, Invalidation)> {
        let started = Instant::now();
        let guard = PageInvalidationGuard::new(self.tier);

        let records = self.store.stream_all_score_records().await?;

        if !options.resume {
            self.tier.index()?.clear();
            self.tier.snapshots()?.clear();
            debug!("Cleared ranking index and snapshot cache");
        }

        let mut resolved = records
            .map(|item| self.resolve(item))
            .buffer_unordered(self.concurrency);

        let mut outcomes = Vec::new();
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = options.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = resolved.next() => next,
            };

            let Some(item) = next else { break };

            let outcome = match item {
                Ok(record) => self.write(record, options.resume)?,
                Err(failed) => failed,
            };
            outcomes.push(outcome);
        }

        if cancelled {
            warn!(processed = outcomes.len(), "Rebuild cancelled");
        }

        let invalidation = guard.complete()?;
        if !cancelled {
            self.tier.mark_rebuilt();
        }

        let report = RebuildReport::from_outcomes(rebuild_id, outcomes, cancelled, started);
        Ok((report, invalidation))
    }

    /// Attach derived counts, turning any error into a failed outcome.
    async fn resolve(
        &self,
        item: Result<ScoreRecord>,
    ) -> std::result::Result<ScoreRecord, EntityOutcome> {
        let record = item.map_err(|e| {
            warn!(error = %e, "Score store yielded an unreadable record");
            EntityOutcome::Failed {
                entity_id: None,
                reason: e.to_string(),
            }
        })?;

        let Some(derived) = self.derived else {
            return Ok(record);
        };

        match derived.derived_counts(&record.entity_id).await {
            Ok(counts) => Ok(record.with_derived(counts)),
            Err(e) => {
                warn!(entity_id = %record.entity_id, error = %e, "Skipping entity in rebuild");
                Err(EntityOutcome::Failed {
                    entity_id: Some(record.entity_id),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn write(&self, record: ScoreRecord, resume: bool) -> Result<EntityOutcome> {
        let index = self.tier.index()?;
        let snapshots = self.tier.snapshots()?;

        let entity_id = record.entity_id.clone();
        let snapshot = EntitySnapshot::from(&record);

        if resume
            && index.score_of(&entity_id) == Some(record.score)
            && snapshots.get(&entity_id).as_ref() == Some(&snapshot)
        {
            return Ok(EntityOutcome::Skipped { entity_id });
        }

        index.upsert(&entity_id, record.score);
        snapshots.put(entity_id.clone(), snapshot);
        Ok(EntityOutcome::Added { entity_id })
    }
}
