//! Rank Resolver
//!
//! Answers "what is entity X's rank" from the ranking index when it is warm.
//! When the index is closed or does not know the entity, the rank is
//! recomputed against the Score Store as `count(score > own) + 1`. That
//! path is O(n) on the store and only meant as a degraded answer.
//!
//! Resolution never fails: if neither path can answer, the entity is
//! reported as unranked so that a profile view can still render.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::with_timeout;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{EntityId, EventPublisher, ScoreStore};
use crate::error::{Error, Result};
use crate::ranking::metrics::rank_source;
use crate::ranking::{CacheTier, EngineMetrics};

/// Which path produced a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankSource {
    /// Position in the ranking index
    Index,
    /// Count of strictly higher scores in the Score Store
    Fallback,
}

/// Outcome of a rank lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RankResolution {
    Ranked { rank: u64, source: RankSource },
    Unranked,
}

impl RankResolution {
    /// 1-based rank, if any
    pub fn rank(&self) -> Option<u64> {
        match self {
            RankResolution::Ranked { rank, .. } => Some(*rank),
            RankResolution::Unranked => None,
        }
    }

    pub fn source(&self) -> Option<RankSource> {
        match self {
            RankResolution::Ranked { source, .. } => Some(*source),
            RankResolution::Unranked => None,
        }
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, RankResolution::Ranked { .. })
    }
}

/// Resolves ranks with an index-first, store-count fallback strategy.
pub struct RankResolver {
    tier: Arc<CacheTier>,
    store: Arc<dyn ScoreStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<EngineMetrics>,
    timeout: Duration,
}

impl RankResolver {
    pub fn new(
        tier: Arc<CacheTier>,
        store: Arc<dyn ScoreStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<EngineMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            tier,
            store,
            publisher,
            metrics,
            timeout,
        }
    }

    /// Resolve the 1-based rank of an entity.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn resolve(&self, entity_id: &EntityId) -> RankResolution {
        let reason = match self.tier.index() {
            Ok(index) => match index.rank_of(entity_id) {
                Some(position) => {
                    self.metrics.record_rank_lookup(rank_source::INDEX);
                    return RankResolution::Ranked {
                        rank: position as u64 + 1,
                        source: RankSource::Index,
                    };
                }
                None => "entity not in ranking index".to_string(),
            },
            Err(e) => e.to_string(),
        };

        debug!(reason = %reason, "Falling back to score store count");

        match with_timeout(self.timeout, "rank_fallback", self.count_rank(entity_id)).await {
            Ok(Some(rank)) => {
                warn!(rank, reason = %reason, "Rank served from degraded fallback path");
                self.metrics.record_rank_lookup(rank_source::FALLBACK);

                let event = DomainEvent::rank_fallback_used(entity_id, reason);
                if let Err(e) = self.publisher.publish(event).await {
                    warn!(error = %e, "Failed to publish rank fallback event");
                }

                RankResolution::Ranked {
                    rank,
                    source: RankSource::Fallback,
                }
            }
            Ok(None) => {
                debug!("Entity has no score record; unranked");
                self.metrics.record_rank_lookup(rank_source::UNRANKED);
                RankResolution::Unranked
            }
            Err(e) => {
                warn!(error = %e, "Rank fallback failed; unranked");
                self.metrics.record_rank_lookup(rank_source::UNRANKED);
                RankResolution::Unranked
            }
        }
    }

    /// `count(score > own) + 1`, or `None` when the entity has no record.
    async fn count_rank(&self, entity_id: &EntityId) -> Result<Option<u64>> {
        let record = match self.store.get_score_record(entity_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        let higher = self.store.count_with_score_greater_than(record.score).await?;
        higher
            .checked_add(1)
            .map(Some)
            .ok_or_else(|| Error::Internal("rank overflow".into()))
    }
}

impl std::fmt::Debug for RankResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankResolver")
            .field("timeout", &self.timeout)
            .finish()
    }
}
