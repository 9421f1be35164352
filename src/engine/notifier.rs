//! Score-Change Notifier
//!
//! Entry point for code elsewhere in the platform that has just committed a
//! score change (badge awarded, quiz graded) and needs the leaderboard to
//! follow. The call is best effort: a failure is logged and reported back as
//! a [`NotifyOutcome`], never as an error, and it never rolls back the
//! caller's own mutation. The leaderboard catches up on the next successful
//! Update or Rebuild.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::leaderboard::{LeaderboardEngine, UpdateSummary};
use crate::domain::ports::EntityId;

/// Result of a best-effort propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The index now reflects the stored score
    Propagated(UpdateSummary),
    /// Propagation failed; the leaderboard is stale for this entity
    Failed {
        entity_id: EntityId,
        error: String,
        retryable: bool,
    },
}

impl NotifyOutcome {
    pub fn is_propagated(&self) -> bool {
        matches!(self, NotifyOutcome::Propagated(_))
    }
}

/// Best-effort Update caller for the surrounding system.
#[derive(Debug, Clone)]
pub struct ScoreChangeNotifier {
    engine: Arc<LeaderboardEngine>,
}

impl ScoreChangeNotifier {
    pub fn new(engine: Arc<LeaderboardEngine>) -> Self {
        Self { engine }
    }

    /// Propagate a committed score change, logging any failure.
    pub async fn notify(&self, entity_id: &EntityId) -> NotifyOutcome {
        match self.engine.update(entity_id).await {
            Ok(summary) => {
                debug!(entity_id = %entity_id, "Leaderboard notified");
                NotifyOutcome::Propagated(summary)
            }
            Err(e) => {
                warn!(
                    entity_id = %entity_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Leaderboard update failed; score change stands, leaderboard stale"
                );
                NotifyOutcome::Failed {
                    entity_id: entity_id.clone(),
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                }
            }
        }
    }

    /// Run [`notify`](Self::notify) on a background task.
    pub fn notify_detached(&self, entity_id: EntityId) -> JoinHandle<NotifyOutcome> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify(&entity_id).await })
    }
}
