//! Engine configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::ranking::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_TTL_SECS};

/// Configuration for the leaderboard engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time-to-live of a cached page
    pub page_ttl: Duration,

    /// Largest accepted page size
    pub max_page_size: u64,

    /// Page size used when the caller gives none
    pub default_page_size: u64,

    /// Request-scoped timeout for Get Page, Update and the rank fallback
    pub request_timeout: Duration,

    /// Concurrent derived-count lookups during a rebuild
    pub rebuild_concurrency: usize,

    /// Rebuild on open when the index is empty
    pub rebuild_on_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_ttl: Duration::from_secs(DEFAULT_PAGE_TTL_SECS),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(10),
            rebuild_concurrency: 16,
            rebuild_on_open: true,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(Error::Config("max_page_size must be at least 1".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(Error::Config(format!(
                "default_page_size must be between 1 and {}",
                self.max_page_size
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be positive".into()));
        }
        if self.rebuild_concurrency == 0 {
            return Err(Error::Config("rebuild_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
