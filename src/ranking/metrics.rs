//! Engine Metrics
//!
//! Prometheus instruments for page serving, updates, rebuilds and rank
//! lookups. Each engine owns its own `Registry` so several engines can live
//! in one process (tests, multi-tenant hosting) without name clashes.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::error::Result;

/// Label values for `podium_page_requests_total`
pub mod page_source {
    pub const CACHE: &str = "cache";
    pub const COMPUTED: &str = "computed";
    pub const ERROR: &str = "error";
}

/// Label values for `podium_rank_lookups_total`
pub mod rank_source {
    pub const INDEX: &str = "index";
    pub const FALLBACK: &str = "fallback";
    pub const UNRANKED: &str = "unranked";
}

/// Prometheus instruments for one engine instance.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    page_requests: IntCounterVec,
    updates: IntCounterVec,
    rebuilds: IntCounterVec,
    rebuild_failed_entities: IntCounter,
    rank_lookups: IntCounterVec,
    invalidations: IntCounter,
    index_entries: IntGauge,
    page_assembly: Histogram,
}

impl EngineMetrics {
    /// Create and register every instrument
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let page_requests = IntCounterVec::new(
            Opts::new("podium_page_requests_total", "Leaderboard page requests"),
            &["source"],
        )?;
        let updates = IntCounterVec::new(
            Opts::new("podium_updates_total", "Score-change propagations"),
            &["status"],
        )?;
        let rebuilds = IntCounterVec::new(
            Opts::new("podium_rebuilds_total", "Ranking index rebuilds"),
            &["status"],
        )?;
        let rebuild_failed_entities = IntCounter::new(
            "podium_rebuild_failed_entities_total",
            "Entities skipped by a rebuild because of an error",
        )?;
        let rank_lookups = IntCounterVec::new(
            Opts::new("podium_rank_lookups_total", "Rank lookups by answering path"),
            &["source"],
        )?;
        let invalidations = IntCounter::new(
            "podium_page_cache_invalidations_total",
            "Bulk page cache invalidations",
        )?;
        let index_entries = IntGauge::new("podium_index_entries", "Entries in the ranking index")?;
        let page_assembly = Histogram::with_opts(
            HistogramOpts::new(
                "podium_page_assembly_seconds",
                "Time spent assembling a page on a cache miss",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;

        registry.register(Box::new(page_requests.clone()))?;
        registry.register(Box::new(updates.clone()))?;
        registry.register(Box::new(rebuilds.clone()))?;
        registry.register(Box::new(rebuild_failed_entities.clone()))?;
        registry.register(Box::new(rank_lookups.clone()))?;
        registry.register(Box::new(invalidations.clone()))?;
        registry.register(Box::new(index_entries.clone()))?;
        registry.register(Box::new(page_assembly.clone()))?;

        Ok(Self {
            registry,
            page_requests,
            updates,
            rebuilds,
            rebuild_failed_entities,
            rank_lookups,
            invalidations,
            index_entries,
            page_assembly,
        })
    }

    pub fn record_page(&self, source: &str) {
        self.page_requests.with_label_values(&[source]).inc();
    }

    pub fn observe_page_assembly(&self, elapsed: Duration) {
        self.page_assembly.observe(elapsed.as_secs_f64());
    }

    pub fn record_update(&self, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        self.updates.with_label_values(&[status]).inc();
    }

    pub fn record_rebuild(&self, status: &str, failed_entities: usize) {
        self.rebuilds.with_label_values(&[status]).inc();
        self.rebuild_failed_entities.inc_by(failed_entities as u64);
    }

    pub fn record_rank_lookup(&self, source: &str) {
        self.rank_lookups.with_label_values(&[source]).inc();
    }

    pub fn record_invalidation(&self) {
        self.invalidations.inc();
    }

    pub fn set_index_entries(&self, entries: usize) {
        self.index_entries.set(entries as i64);
    }

    pub fn page_requests(&self, source: &str) -> u64 {
        self.page_requests.with_label_values(&[source]).get()
    }

    pub fn rank_lookups(&self, source: &str) -> u64 {
        self.rank_lookups.with_label_values(&[source]).get()
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.get()
    }

    /// Encode every instrument in the text exposition format.
    ///
    /// Returns the content type alongside the body.
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("invalidations", &self.invalidations.get())
            .field("index_entries", &self.index_entries.get())
            .finish()
    }
}
