//! Leaderboard Engine
//!
//! The operations callers invoke against the ranking state:
//!
//! - **Get Page**: serve a paginated leaderboard, memoized in the page cache
//! - **Update**: propagate one entity's authoritative score into the tier
//! - **Rebuild**: resynchronize the whole tier from the Score Store
//! - **Rank Of**: resolve one entity's rank, degrading to a store count
//!
//! Every operation that reaches the Score Store runs under the
//! request-scoped timeout from [`EngineConfig`].

pub mod config;
pub mod leaderboard;
pub mod notifier;
pub mod rebuild;
pub mod resolver;

pub use config::EngineConfig;
pub use leaderboard::{LeaderboardEngine, LeaderboardEngineBuilder, PageResponse, UpdateSummary};
pub use notifier::{NotifyOutcome, ScoreChangeNotifier};
pub use rebuild::{EntityOutcome, RebuildOptions, RebuildReport};
pub use resolver::{RankResolution, RankResolver, RankSource};

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run `fut` under a request-scoped timeout.
pub(crate) async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
