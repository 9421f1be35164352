//! Leaderboard Engine
//!
//! Explicitly constructed handle over one cache tier and its collaborators.
//! Several engines can live side by side, each with its own tier, metrics
//! registry and publisher.
//!
//! # Update Ordering
//!
//! Update awaits only on the Score Store and derived-count reads. Once the
//! authoritative record is in hand, the index upsert, snapshot put and page
//! invalidation run back to back without suspending, so a timeout or a
//! store failure can never leave a partial write behind.
//!
//! Two concurrent Updates for the same entity race last-write-wins on the
//! index; no per-entity lock is taken.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::config::EngineConfig;
use super::rebuild::{RebuildOptions, RebuildProcedure, RebuildReport};
use super::resolver::{RankResolution, RankResolver};
use super::with_timeout;
use crate::adapters::LoggingEventPublisher;
use crate::domain::events::{DomainEvent, InvalidationReason};
use crate::domain::ports::{DerivedCountProvider, EntityId, EventPublisher, ScoreStore};
use crate::error::{Error, Result};
use crate::ranking::metrics::page_source;
use crate::ranking::{
    CacheTier, EngineMetrics, EntitySnapshot, Invalidation, LeaderboardPage, LeaderboardRow,
    PageQuery, Pagination, TierStats,
};

// =============================================================================
// Responses
// =============================================================================

/// A page plus whether it came from the page cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    #[serde(flatten)]
    pub page: Arc<LeaderboardPage>,
    pub cached: bool,
}

impl PageResponse {
    pub fn rows(&self) -> &[LeaderboardRow] {
        &self.page.rows
    }

    pub fn pagination(&self) -> Pagination {
        self.page.pagination
    }
}

/// Rank-relevant state of an entity after an Update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub entity_id: EntityId,
    pub score: u64,
    pub badge_count: u64,
    pub item_count: u64,
    /// 1-based rank in the index right after the write
    pub rank: Option<u64>,
}

// =============================================================================
// Engine
// =============================================================================

/// The ranking engine: Get Page, Update, Rebuild and Rank Of.
pub struct LeaderboardEngine {
    config: EngineConfig,
    tier: Arc<CacheTier>,
    store: Arc<dyn ScoreStore>,
    derived: Option<Arc<dyn DerivedCountProvider>>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<EngineMetrics>,
    resolver: RankResolver,
    rebuild_lock: Mutex<()>,
}

impl LeaderboardEngine {
    /// Start building an engine over a Score Store
    pub fn builder(store: Arc<dyn ScoreStore>) -> LeaderboardEngineBuilder {
        LeaderboardEngineBuilder::new(store)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the cache tier for traffic.
    ///
    /// Pages cached before a previous close are dropped. With
    /// `rebuild_on_open`, an empty index is rebuilt before this returns.
    #[instrument(skip(self))]
    pub async fn open(&self) -> Result<Option<RebuildReport>> {
        if self.tier.open() {
            let invalidation = self.tier.pages()?.invalidate_all();
            debug!(epoch = invalidation.epoch, "Dropped pages from before reopen");
            info!("Cache tier opened");
            self.publish(DomainEvent::tier_opened()).await;
        }

        if self.config.rebuild_on_open {
            self.ensure_initialized().await
        } else {
            Ok(None)
        }
    }

    /// Rebuild if the index is empty.
    pub async fn ensure_initialized(&self) -> Result<Option<RebuildReport>> {
        if !self.tier.index()?.is_empty() {
            return Ok(None);
        }

        info!("Ranking index is empty, rebuilding before serving traffic");
        self.rebuild().await.map(Some)
    }

    /// Close the cache tier. Contents are kept.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        if self.tier.close() {
            info!("Cache tier closed");
            self.publish(DomainEvent::tier_closed()).await;
        }
    }

    pub fn is_open(&self) -> bool {
        self.tier.is_open()
    }

    /// Tier open and Score Store reachable
    pub async fn is_ready(&self) -> bool {
        if !self.tier.is_open() {
            return false;
        }
        match with_timeout(self.config.request_timeout, "health_check", self.store.health_check()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "Score store health check failed");
                false
            }
        }
    }

    // =========================================================================
    // Get Page
    // =========================================================================

    /// Validate a page request, filling in defaults.
    pub fn page_query(&self, page: Option<u64>, limit: Option<u64>) -> Result<PageQuery> {
        PageQuery::new(
            page.unwrap_or(1),
            limit.unwrap_or(self.config.default_page_size),
            self.config.max_page_size,
        )
    }

    /// Serve one leaderboard page.
    #[instrument(skip(self))]
    pub async fn get_page(&self, page: u64, page_size: u64) -> Result<PageResponse> {
        let query = PageQuery::new(page, page_size, self.config.max_page_size)?;

        let result = with_timeout(self.config.request_timeout, "get_page", self.load_page(query)).await;
        if let Err(e) = &result {
            self.metrics.record_page(page_source::ERROR);
            warn!(error = %e, "Get page failed");
        }
        result
    }

    async fn load_page(&self, query: PageQuery) -> Result<PageResponse> {
        let pages = self.tier.pages()?;
        let key = query.key();

        if let Some(page) = pages.get(&key) {
            debug!("Page cache hit");
            self.metrics.record_page(page_source::CACHE);
            return Ok(PageResponse { page, cached: true });
        }

        let started = Instant::now();
        let epoch = pages.epoch();
        let index = self.tier.index()?;
        let snapshots = self.tier.snapshots()?;

        let total = index.len() as u64;
        if total == 0 {
            self.metrics.record_page(page_source::COMPUTED);
            return Ok(PageResponse {
                page: Arc::new(LeaderboardPage::empty(&query)),
                cached: false,
            });
        }

        let entries = index.range_by_rank(query.offset(), query.limit() as usize);

        let mut missing = 0usize;
        let rows: Vec<LeaderboardRow> = entries
            .into_iter()
            .map(|entry| {
                let snapshot = snapshots.get(&entry.entity_id);
                if snapshot.is_none() {
                    missing += 1;
                }
                LeaderboardRow::assemble(entry, snapshot)
            })
            .collect();

        if missing > 0 {
            warn!(missing, "Index entries without snapshots, serving placeholder display fields");
        }

        let page = Arc::new(LeaderboardPage::new(rows, Pagination::new(total, &query)));
        if !pages.put(key, Arc::clone(&page), self.config.page_ttl, epoch) {
            debug!("Page cache invalidated during assembly, result not cached");
        }

        self.metrics.observe_page_assembly(started.elapsed());
        self.metrics.record_page(page_source::COMPUTED);
        debug!(rows = page.rows.len(), total, "Page assembled");

        Ok(PageResponse {
            page,
            cached: false,
        })
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Propagate an entity's authoritative score into the cache tier.
    ///
    /// On error nothing in the tier has changed and the call can be retried.
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub async fn update(&self, entity_id: &EntityId) -> Result<UpdateSummary> {
        let result = with_timeout(self.config.request_timeout, "update", self.propagate(entity_id)).await;
        self.metrics.record_update(result.is_ok());

        match result {
            Ok((summary, invalidation)) => {
                self.metrics.record_invalidation();
                self.publish_all(vec![
                    DomainEvent::score_updated(entity_id, summary.score, summary.rank),
                    DomainEvent::page_cache_invalidated(
                        InvalidationReason::Update,
                        invalidation.dropped,
                        invalidation.epoch,
                    ),
                ])
                .await;
                info!(score = summary.score, rank = ?summary.rank, "Score propagated");
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "Update failed, ranking state unchanged");
                Err(e)
            }
        }
    }

    async fn propagate(&self, entity_id: &EntityId) -> Result<(UpdateSummary, Invalidation)> {
        // Fail before touching the store when the tier is already down.
        self.tier.index()?;

        let record = self
            .store
            .get_score_record(entity_id)
            .await?
            .ok_or_else(|| Error::not_found(entity_id.as_str()))?;

        let record = match &self.derived {
            Some(derived) => record.with_derived(derived.derived_counts(entity_id).await?),
            None => record,
        };

        // No suspension points below: index, snapshot, invalidate.
        let index = self.tier.index()?;
        let snapshots = self.tier.snapshots()?;
        let pages = self.tier.pages()?;

        let outcome = index.upsert(entity_id, record.score);
        snapshots.put(entity_id.clone(), EntitySnapshot::from(&record));
        let invalidation = pages.invalidate_all();

        debug!(?outcome, epoch = invalidation.epoch, "Index and snapshot written");
        self.metrics.set_index_entries(index.len());

        let summary = UpdateSummary {
            entity_id: entity_id.clone(),
            score: record.score,
            badge_count: record.badge_count,
            item_count: record.item_count,
            rank: index.rank_of(entity_id).map(|position| position as u64 + 1),
        };
        Ok((summary, invalidation))
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    /// Full rebuild from the Score Store.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        self.rebuild_with(RebuildOptions::default()).await
    }

    /// Rebuild with cancellation or resume.
    ///
    /// Only one rebuild runs at a time; a concurrent call fails with
    /// `RebuildInProgress`.
    #[instrument(skip(self, options), fields(resume = options.resume))]
    pub async fn rebuild_with(&self, options: RebuildOptions) -> Result<RebuildReport> {
        let _guard = self
            .rebuild_lock
            .try_lock()
            .map_err(|_| Error::RebuildInProgress)?;

        self.tier.index()?;

        let rebuild_id = Uuid::new_v4();
        info!(%rebuild_id, resume = options.resume, "Starting rebuild");
        self.publish(DomainEvent::rebuild_started(rebuild_id.to_string(), options.resume))
            .await;

        let procedure = RebuildProcedure::new(
            &self.tier,
            self.store.as_ref(),
            self.derived.as_deref(),
            self.config.rebuild_concurrency,
        );

        let (report, invalidation) = match procedure.run(rebuild_id, &options).await {
            Ok(done) => done,
            Err(e) => {
                error!(%rebuild_id, error = %e, "Rebuild aborted");
                self.metrics.record_rebuild("error", 0);
                self.metrics.record_invalidation();
                if let Ok(index) = self.tier.index() {
                    self.metrics.set_index_entries(index.len());
                }
                return Err(e);
            }
        };

        let status = if report.cancelled { "cancelled" } else { "completed" };
        self.metrics.record_rebuild(status, report.failed);
        self.metrics.record_invalidation();
        if let Ok(index) = self.tier.index() {
            self.metrics.set_index_entries(index.len());
        }

        info!(
            %rebuild_id,
            processed = report.processed,
            added = report.added,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Rebuild finished"
        );

        self.publish_all(vec![
            DomainEvent::page_cache_invalidated(
                InvalidationReason::Rebuild,
                invalidation.dropped,
                invalidation.epoch,
            ),
            DomainEvent::RebuildCompleted {
                rebuild_id: rebuild_id.to_string(),
                processed: report.processed,
                added: report.added,
                skipped: report.skipped,
                failed: report.failed,
                cancelled: report.cancelled,
                duration_ms: report.duration_ms,
                timestamp: chrono::Utc::now(),
            },
        ])
        .await;

        Ok(report)
    }

    // =========================================================================
    // Rank Of
    // =========================================================================

    /// Resolve an entity's 1-based rank; never fails.
    pub async fn rank_of(&self, entity_id: &EntityId) -> RankResolution {
        self.resolver.resolve(entity_id).await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn stats(&self) -> TierStats {
        self.tier.stats()
    }

    /// Drop expired pages. Lookups already skip them; this reclaims memory.
    pub fn purge_expired_pages(&self) -> Result<usize> {
        Ok(self.tier.pages()?.purge_expired())
    }

    pub fn tier(&self) -> &Arc<CacheTier> {
        &self.tier
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!(error = %e, "Failed to publish domain event");
        }
    }

    async fn publish_all(&self, events: Vec<DomainEvent>) {
        if let Err(e) = self.publisher.publish_all(events).await {
            warn!(error = %e, "Failed to publish domain events");
        }
    }
}

impl std::fmt::Debug for LeaderboardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardEngine")
            .field("config", &self.config)
            .field("tier", &self.tier.stats())
            .field("derived_counts", &self.derived.is_some())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`LeaderboardEngine`].
pub struct LeaderboardEngineBuilder {
    store: Arc<dyn ScoreStore>,
    config: EngineConfig,
    derived: Option<Arc<dyn DerivedCountProvider>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    tier: Option<Arc<CacheTier>>,
}

impl LeaderboardEngineBuilder {
    fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            derived: None,
            publisher: None,
            tier: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Recompute badge/item counts through a provider on Update and Rebuild
    pub fn derived_counts(mut self, provider: Arc<dyn DerivedCountProvider>) -> Self {
        self.derived = Some(provider);
        self
    }

    /// Event sink; defaults to a [`LoggingEventPublisher`]
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Share an existing tier instead of creating a fresh one
    pub fn tier(mut self, tier: Arc<CacheTier>) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn build(self) -> Result<LeaderboardEngine> {
        self.config.validate()?;

        let tier = self.tier.unwrap_or_default();
        let publisher = self
            .publisher
            .unwrap_or_else(|| Arc::new(LoggingEventPublisher::new()));
        let metrics = Arc::new(EngineMetrics::new()?);
        let resolver = RankResolver::new(
            Arc::clone(&tier),
            Arc::clone(&self.store),
            Arc::clone(&publisher),
            Arc::clone(&metrics),
            self.config.request_timeout,
        );

        Ok(LeaderboardEngine {
            config: self.config,
            tier,
            store: self.store,
            derived: self.derived,
            publisher,
            metrics,
            resolver,
            rebuild_lock: Mutex::new(()),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDerivedCounts, InMemoryEventCollector, InMemoryScoreStore};
    use crate::domain::ports::{DerivedCounts, ScoreRecord};
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn store() -> Arc<InMemoryScoreStore> {
        Arc::new(InMemoryScoreStore::with_records(vec![
            ScoreRecord::new("a", "Ada", 100).with_counts(1, 2),
            ScoreRecord::new("b", "Bo", 300).with_counts(4, 0),
            ScoreRecord::new("c", "Cy", 200),
        ]))
    }

    async fn engine_with(
        store: Arc<InMemoryScoreStore>,
    ) -> (LeaderboardEngine, Arc<InMemoryEventCollector>) {
        let events = Arc::new(InMemoryEventCollector::new());
        let engine = LeaderboardEngine::builder(store)
            .publisher(events.clone())
            .build()
            .unwrap();
        engine.open().await.unwrap();
        (engine, events)
    }

    fn ids(response: &PageResponse) -> Vec<&str> {
        response.rows().iter().map(|r| r.entity_id.as_str()).collect()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test]
    async fn test_open_rebuilds_empty_index() {
        let events = Arc::new(InMemoryEventCollector::new());
        let engine = LeaderboardEngine::builder(store())
            .publisher(events.clone())
            .build()
            .unwrap();

        let report = engine.open().await.unwrap().unwrap();

        assert_eq!(report.added, 3);
        assert_eq!(engine.stats().index_entries, 3);
        assert_eq!(events.count("TierOpened"), 1);
        assert_eq!(events.count("RebuildCompleted"), 1);

        // Second open is a no-op: tier already open, index populated.
        assert!(engine.open().await.unwrap().is_none());
        assert_eq!(events.count("TierOpened"), 1);
    }

    #[tokio::test]
    async fn test_open_without_startup_rebuild() {
        let engine = LeaderboardEngine::builder(store())
            .config(EngineConfig {
                rebuild_on_open: false,
                ..Default::default()
            })
            .build()
            .unwrap();

        assert!(engine.open().await.unwrap().is_none());
        assert_eq!(engine.stats().index_entries, 0);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let result = LeaderboardEngine::builder(store())
            .config(EngineConfig {
                max_page_size: 0,
                ..Default::default()
            })
            .build();

        assert_matches!(result, Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_close_publishes_event_and_blocks_pages() {
        let (engine, events) = engine_with(store()).await;

        engine.close().await;

        assert!(!engine.is_open());
        assert!(!engine.is_ready().await);
        assert_eq!(events.count("TierClosed"), 1);
        assert_matches!(engine.get_page(1, 10).await, Err(Error::CacheUnavailable(_)));
    }

    // =========================================================================
    // Get Page
    // =========================================================================

    #[tokio::test]
    async fn test_get_page_miss_then_hit() {
        let (engine, _) = engine_with(store()).await;

        let first = engine.get_page(1, 2).await.unwrap();
        assert!(!first.cached);
        assert_eq!(ids(&first), vec!["b", "c"]);

        let second = engine.get_page(1, 2).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.rows(), first.rows());
        assert_eq!(engine.metrics().page_requests(page_source::CACHE), 1);
        assert_eq!(engine.metrics().page_requests(page_source::COMPUTED), 1);
    }

    #[tokio::test]
    async fn test_get_page_rows_carry_snapshot_fields() {
        let (engine, _) = engine_with(store()).await;

        let page = engine.get_page(1, 10).await.unwrap();
        let bo = &page.rows()[0];

        assert_eq!(bo.rank, 1);
        assert_eq!(bo.display_name.as_deref(), Some("Bo"));
        assert_eq!(bo.badge_count, Some(4));
    }

    #[tokio::test]
    async fn test_get_page_missing_snapshot_uses_placeholders() {
        let (engine, _) = engine_with(store()).await;
        engine
            .tier()
            .index()
            .unwrap()
            .upsert(&EntityId::new("drifted"), 1_000);

        let page = engine.get_page(1, 10).await.unwrap();
        let row = &page.rows()[0];

        assert_eq!(row.entity_id.as_str(), "drifted");
        assert_eq!(row.rank, 1);
        assert!(!row.has_snapshot());
        assert_eq!(page.rows().len(), 4);
    }

    #[tokio::test]
    async fn test_get_page_empty_index() {
        let engine = LeaderboardEngine::builder(Arc::new(InMemoryScoreStore::new()))
            .build()
            .unwrap();
        engine.open().await.unwrap();

        let page = engine.get_page(1, 10).await.unwrap();

        assert!(page.rows().is_empty());
        assert_eq!(page.pagination().total_pages, 0);
        assert_eq!(page.pagination().total_items, 0);
        assert_eq!(engine.stats().cached_pages, 0);
    }

    #[tokio::test]
    async fn test_get_page_validation() {
        let (engine, _) = engine_with(store()).await;

        assert_matches!(engine.get_page(0, 10).await, Err(Error::Validation(_)));
        assert_matches!(engine.get_page(1, 0).await, Err(Error::Validation(_)));
        assert_matches!(engine.get_page(1, 101).await, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_page_query_defaults() {
        let (engine, _) = engine_with(store()).await;

        let query = engine.page_query(None, None).unwrap();
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), 10);

        assert!(engine.page_query(Some(2), Some(500)).is_err());
    }

    // =========================================================================
    // Update
    // =========================================================================

    #[tokio::test]
    async fn test_update_moves_entity_and_invalidates() {
        let store = store();
        let (engine, events) = engine_with(store.clone()).await;
        engine.get_page(1, 2).await.unwrap();

        store.set_score(&EntityId::new("a"), 350);
        let summary = engine.update(&EntityId::new("a")).await.unwrap();

        assert_eq!(summary.score, 350);
        assert_eq!(summary.rank, Some(1));
        assert_eq!(summary.badge_count, 1);

        let page = engine.get_page(1, 2).await.unwrap();
        assert!(!page.cached);
        assert_eq!(ids(&page), vec!["a", "b"]);
        assert_eq!(events.count("ScoreUpdated"), 1);
        assert_eq!(events.count("PageCacheInvalidated"), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_entity_is_not_found() {
        let (engine, _) = engine_with(store()).await;
        let epoch = engine.stats().page_cache_epoch;

        let result = engine.update(&EntityId::new("zed")).await;

        assert_matches!(result, Err(Error::NotFound { entity_id }) if entity_id == "zed");
        assert_eq!(engine.stats().page_cache_epoch, epoch);
    }

    #[tokio::test]
    async fn test_update_store_failure_has_no_side_effects() {
        let store = store();
        let (engine, _) = engine_with(store.clone()).await;
        let cached = engine.get_page(1, 10).await.unwrap();
        let before = engine.tier().index().unwrap().entries();

        store.set_score(&EntityId::new("a"), 900);
        store.set_available(false);

        assert_matches!(
            engine.update(&EntityId::new("a")).await,
            Err(Error::ScoreStore(_))
        );
        assert_eq!(engine.tier().index().unwrap().entries(), before);

        let again = engine.get_page(1, 10).await.unwrap();
        assert!(again.cached);
        assert_eq!(again.rows(), cached.rows());
    }

    #[tokio::test]
    async fn test_update_with_closed_tier_fails() {
        let (engine, _) = engine_with(store()).await;
        engine.close().await;

        assert_matches!(
            engine.update(&EntityId::new("a")).await,
            Err(Error::CacheUnavailable(_))
        );
    }

    #[tokio::test]
    async fn test_update_recomputes_derived_counts() {
        let derived = Arc::new(InMemoryDerivedCounts::new());
        derived.set(&EntityId::new("c"), DerivedCounts::new(7, 3));
        let engine = LeaderboardEngine::builder(store())
            .derived_counts(derived.clone())
            .build()
            .unwrap();
        engine.open().await.unwrap();

        let summary = engine.update(&EntityId::new("c")).await.unwrap();
        assert_eq!((summary.badge_count, summary.item_count), (7, 3));

        derived.fail_for(&EntityId::new("c"));
        assert_matches!(
            engine.update(&EntityId::new("c")).await,
            Err(Error::DerivedCounts { .. })
        );
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let store = store();
        let (engine, _) = engine_with(store.clone()).await;
        store.set_score(&EntityId::new("c"), 250);

        let first = engine.update(&EntityId::new("c")).await.unwrap();
        let entries = engine.tier().index().unwrap().entries();
        let snapshot = engine.tier().snapshots().unwrap().get(&EntityId::new("c"));

        let second = engine.update(&EntityId::new("c")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.tier().index().unwrap().entries(), entries);
        assert_eq!(
            engine.tier().snapshots().unwrap().get(&EntityId::new("c")),
            snapshot
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_times_out_without_side_effects() {
        let store = store();
        let (engine, _) = engine_with(store.clone()).await;
        let epoch = engine.stats().page_cache_epoch;

        store.set_latency(Duration::from_secs(60));
        let result = engine.update(&EntityId::new("a")).await;

        assert_matches!(result, Err(ref e @ Error::Timeout { .. }) if e.is_retryable());
        assert_eq!(engine.stats().page_cache_epoch, epoch);
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let (engine, _) = engine_with(store()).await;
        let before = engine.tier().index().unwrap().entries();

        let report = engine.rebuild().await.unwrap();

        assert_eq!(report.added, 3);
        assert_eq!(engine.tier().index().unwrap().entries(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_rebuild_is_rejected() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let engine = Arc::new(
            LeaderboardEngine::builder(store)
                .config(EngineConfig {
                    rebuild_on_open: false,
                    ..Default::default()
                })
                .build()
                .unwrap(),
        );
        engine.open().await.unwrap();

        let running = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.rebuild().await })
        };
        tokio::task::yield_now().await;

        assert_matches!(engine.rebuild().await, Err(Error::RebuildInProgress));
        assert!(running.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_rebuild_on_closed_tier_fails() {
        let engine = LeaderboardEngine::builder(store()).build().unwrap();

        assert_matches!(engine.rebuild().await, Err(Error::CacheUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failed_rebuild_stops_serving_cached_pages() {
        let store = store();
        let (engine, _) = engine_with(store.clone()).await;
        engine.get_page(1, 10).await.unwrap();
        assert!(engine.get_page(1, 10).await.unwrap().cached);

        store.set_available(false);
        assert_matches!(engine.rebuild().await, Err(Error::ScoreStore(_)));
        store.set_available(true);

        let page = engine.get_page(1, 10).await.unwrap();
        assert!(!page.cached);
        assert_eq!(ids(&page), vec!["b", "c", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_rebuild_stops_serving_cached_pages() {
        let derived = Arc::new(InMemoryDerivedCounts::new());
        let engine = LeaderboardEngine::builder(store())
            .derived_counts(derived.clone())
            .build()
            .unwrap();
        engine.open().await.unwrap();
        engine.get_page(1, 10).await.unwrap();
        assert!(engine.get_page(1, 10).await.unwrap().cached);

        derived.set_latency(Duration::from_secs(5));
        let dropped = tokio::time::timeout(Duration::from_secs(1), engine.rebuild()).await;
        assert!(dropped.is_err());

        // Index was cleared before the drop; the page must say so
        let page = engine.get_page(1, 10).await.unwrap();
        assert!(!page.cached);
        assert_eq!(page.pagination().total_items, engine.stats().index_entries as u64);
    }

    // =========================================================================
    // Rank Of
    // =========================================================================

    #[tokio::test]
    async fn test_rank_of_warm_and_degraded() {
        let (engine, events) = engine_with(store()).await;

        assert_eq!(engine.rank_of(&EntityId::new("c")).await.rank(), Some(2));

        engine.close().await;
        let degraded = engine.rank_of(&EntityId::new("c")).await;
        assert_eq!(degraded.rank(), Some(2));
        assert_eq!(events.count("RankFallbackUsed"), 1);
    }
}
