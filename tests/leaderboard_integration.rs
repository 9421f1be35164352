//! Podium Integration Tests
//!
//! End-to-end behavior of the leaderboard engine over the in-memory adapters:
//! - Pagination and ordering
//! - Score-change propagation and invalidation
//! - Rank resolution with the degraded fallback path
//! - Rebuild accounting, cancellation and resume
//! - Concurrency between readers and writers

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use podium::adapters::{InMemoryDerivedCounts, InMemoryEventCollector, InMemoryScoreStore};
use podium::domain::{DerivedCounts, EntityId, ScoreRecord};
use podium::engine::{
    EngineConfig, LeaderboardEngine, PageResponse, RankResolution, RankSource, RebuildOptions,
};
use podium::Error;

fn three_entities() -> Arc<InMemoryScoreStore> {
    Arc::new(InMemoryScoreStore::with_records(vec![
        ScoreRecord::new("A", "Avery", 100).with_contact("avery@example.edu"),
        ScoreRecord::new("B", "Blake", 300).with_counts(5, 2),
        ScoreRecord::new("C", "Casey", 200).with_avatar("avatars/casey.png"),
    ]))
}

async fn open_engine(store: Arc<InMemoryScoreStore>) -> LeaderboardEngine {
    let engine = LeaderboardEngine::builder(store).build().unwrap();
    engine.open().await.unwrap();
    engine
}

fn rows(response: &PageResponse) -> Vec<(u64, &str, u64)> {
    response
        .rows()
        .iter()
        .map(|row| (row.rank, row.entity_id.as_str(), row.score))
        .collect()
}

// =============================================================================
// Pagination Scenarios
// =============================================================================

mod pagination_tests {
    use super::*;

    #[tokio::test]
    async fn test_three_entity_pages() {
        let engine = open_engine(three_entities()).await;

        let first = engine.get_page(1, 2).await.unwrap();
        assert_eq!(rows(&first), vec![(1, "B", 300), (2, "C", 200)]);

        let second = engine.get_page(2, 2).await.unwrap();
        assert_eq!(rows(&second), vec![(3, "A", 100)]);
        assert_eq!(second.pagination().total_pages, 2);
        assert_eq!(second.pagination().total_items, 3);
        assert_eq!(second.pagination().current_page, 2);
        assert_eq!(second.pagination().limit, 2);
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty_not_error() {
        let engine = open_engine(three_entities()).await;

        let page = engine.get_page(5, 10).await.unwrap();

        assert!(page.rows().is_empty());
        assert_eq!(page.pagination().total_pages, 1);
        assert_eq!(page.pagination().total_items, 3);
    }

    #[tokio::test]
    async fn test_page_json_shape() {
        let engine = open_engine(three_entities()).await;

        let page = engine.get_page(1, 3).await.unwrap();
        let json = serde_json::to_value(&page).unwrap();

        assert_eq!(json["cached"], false);
        assert_eq!(json["pagination"]["totalItems"], 3);
        assert_eq!(json["pagination"]["currentPage"], 1);
        assert_eq!(json["rows"][0]["displayName"], "Blake");
        assert_eq!(json["rows"][0]["badgeCount"], 5);
        assert_eq!(json["rows"][1]["avatarRef"], "avatars/casey.png");
    }

    #[tokio::test]
    async fn test_ranks_contiguous_across_many_entities() {
        let store = Arc::new(InMemoryScoreStore::with_records((0..57).map(|i| {
            ScoreRecord::new(format!("s{:02}", i), format!("Student {}", i), (i * 7 % 23) as u64)
        })));
        let engine = open_engine(store).await;

        for page in 1..=6 {
            let response = engine.get_page(page, 10).await.unwrap();
            let offset = (page - 1) * 10;

            assert!(response.rows().len() <= 10);
            for (i, row) in response.rows().iter().enumerate() {
                assert_eq!(row.rank, offset + i as u64 + 1);
            }
            assert!(response
                .rows()
                .windows(2)
                .all(|w| w[0].score >= w[1].score));
        }

        assert_eq!(engine.get_page(6, 10).await.unwrap().rows().len(), 7);
    }
}

// =============================================================================
// Update Scenarios
// =============================================================================

mod update_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_reorders_next_page_read() {
        let store = three_entities();
        let engine = open_engine(store.clone()).await;
        assert!(!engine.get_page(1, 2).await.unwrap().cached);
        assert!(engine.get_page(1, 2).await.unwrap().cached);

        store.set_score(&EntityId::new("A"), 350);
        engine.update(&EntityId::new("A")).await.unwrap();

        let page = engine.get_page(1, 2).await.unwrap();
        assert!(!page.cached);
        assert_eq!(rows(&page), vec![(1, "A", 350), (2, "B", 300)]);
    }

    #[tokio::test]
    async fn test_update_after_badge_award() {
        let store = three_entities();
        let derived = Arc::new(InMemoryDerivedCounts::new());
        let engine = LeaderboardEngine::builder(store.clone())
            .derived_counts(derived.clone())
            .build()
            .unwrap();
        engine.open().await.unwrap();

        // Surrounding system commits the badge and its points first.
        store.apply_delta(&EntityId::new("C"), 150);
        derived.set(&EntityId::new("C"), DerivedCounts::new(1, 0));

        let summary = engine.update(&EntityId::new("C")).await.unwrap();
        assert_eq!(summary.score, 350);
        assert_eq!(summary.badge_count, 1);
        assert_eq!(summary.rank, Some(1));

        let top = engine.get_page(1, 1).await.unwrap();
        assert_eq!(top.rows()[0].badge_count, Some(1));
    }

    #[tokio::test]
    async fn test_failed_update_then_retry() {
        let store = three_entities();
        let engine = open_engine(store.clone()).await;
        store.set_score(&EntityId::new("A"), 500);
        store.set_available(false);

        let err = engine.update(&EntityId::new("A")).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.rank_of(&EntityId::new("A")).await.rank(), Some(3));

        store.set_available(true);
        let summary = engine.update(&EntityId::new("A")).await.unwrap();
        assert_eq!(summary.rank, Some(1));
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let engine = open_engine(three_entities()).await;

        assert_matches!(
            engine.update(&EntityId::new("nobody")).await,
            Err(Error::NotFound { .. })
        );
    }
}

// =============================================================================
// Rank Resolution Scenarios
// =============================================================================

mod rank_tests {
    use super::*;

    #[tokio::test]
    async fn test_rank_of_warm_and_with_index_unavailable() {
        let engine = open_engine(three_entities()).await;

        assert_eq!(
            engine.rank_of(&EntityId::new("C")).await,
            RankResolution::Ranked {
                rank: 2,
                source: RankSource::Index
            }
        );

        engine.close().await;

        assert_eq!(
            engine.rank_of(&EntityId::new("C")).await,
            RankResolution::Ranked {
                rank: 2,
                source: RankSource::Fallback
            }
        );
    }

    #[tokio::test]
    async fn test_rank_of_unknown_entity_is_unranked() {
        let engine = open_engine(three_entities()).await;

        assert_eq!(
            engine.rank_of(&EntityId::new("ghost")).await,
            RankResolution::Unranked
        );
    }

    #[tokio::test]
    async fn test_reopen_serves_from_index_again() {
        let engine = open_engine(three_entities()).await;
        engine.get_page(1, 3).await.unwrap();
        engine.close().await;

        assert_matches!(engine.get_page(1, 3).await, Err(Error::CacheUnavailable(_)));

        assert!(engine.open().await.unwrap().is_none());
        let page = engine.get_page(1, 3).await.unwrap();
        assert!(!page.cached);
        assert_eq!(page.rows().len(), 3);
    }
}

// =============================================================================
// Rebuild Scenarios
// =============================================================================

mod rebuild_tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_rebuild_twice_yields_identical_index() {
        let engine = open_engine(three_entities()).await;

        engine.rebuild().await.unwrap();
        let first = engine.tier().index().unwrap().entries();
        engine.rebuild().await.unwrap();
        let second = engine.tier().index().unwrap().entries();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rebuild_reports_partial_failure() {
        let store = three_entities();
        let derived = Arc::new(InMemoryDerivedCounts::new());
        derived.fail_for(&EntityId::new("B"));
        let events = Arc::new(InMemoryEventCollector::new());
        let engine = LeaderboardEngine::builder(store)
            .derived_counts(derived)
            .publisher(events.clone())
            .build()
            .unwrap();

        let report = engine.open().await.unwrap().unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.added, 2);
        assert_eq!(report.failed, 1);
        assert!(!report.is_clean());
        assert_eq!(rows(&engine.get_page(1, 10).await.unwrap()).len(), 2);
        assert_eq!(events.count("RebuildStarted"), 1);
        assert_eq!(events.count("RebuildCompleted"), 1);
    }

    #[tokio::test]
    async fn test_cancelled_rebuild_resumes() {
        let store = Arc::new(InMemoryScoreStore::with_records(
            (0..20).map(|i| ScoreRecord::new(format!("s{:02}", i), "Student", i as u64)),
        ));
        let engine = LeaderboardEngine::builder(store)
            .config(EngineConfig {
                rebuild_on_open: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        engine.open().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = engine
            .rebuild_with(RebuildOptions::default().with_cancel(cancel))
            .await
            .unwrap();
        assert!(report.cancelled);

        let resumed = engine.rebuild_with(RebuildOptions::resume()).await.unwrap();
        assert!(!resumed.cancelled);
        assert_eq!(resumed.processed, 20);
        assert_eq!(resumed.added + resumed.skipped, 20);
        assert_eq!(engine.stats().index_entries, 20);
    }

    #[test]
    fn test_startup_rebuild_blocking() {
        let report = tokio_test::block_on(async {
            let engine = LeaderboardEngine::builder(three_entities()).build().unwrap();
            engine.open().await.unwrap()
        });

        assert_eq!(report.map(|r| r.added), Some(3));
    }
}

// =============================================================================
// Concurrency Scenarios
// =============================================================================

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_and_reads() {
        let store = Arc::new(InMemoryScoreStore::with_records(
            (0..50).map(|i| ScoreRecord::new(format!("s{:02}", i), "Student", 10)),
        ));
        let engine = Arc::new(open_engine(store.clone()).await);

        let mut tasks = Vec::new();
        for i in 0..50u64 {
            let writer = Arc::clone(&engine);
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let id = EntityId::new(format!("s{:02}", i));
                store.set_score(&id, 100 + i);
                writer.update(&id).await.map(|_| ())
            }));

            let reader = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                reader.get_page(1 + i % 5, 10).await.map(|page| {
                    assert!(page.rows().windows(2).all(|w| w[0].score >= w[1].score));
                })
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Every update has returned: the next read reflects all of them.
        let top = engine.get_page(1, 3).await.unwrap();
        assert_eq!(rows(&top), vec![(1, "s49", 149), (2, "s48", 148), (3, "s47", 147)]);
        assert_eq!(engine.stats().index_entries, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_entity_updates_converge() {
        let store = three_entities();
        let engine = Arc::new(open_engine(store.clone()).await);
        store.set_score(&EntityId::new("A"), 999);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.update(&EntityId::new("A")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.tier().index().unwrap().len(), 3);
        assert_eq!(engine.rank_of(&EntityId::new("A")).await.rank(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out_update() {
        let store = three_entities();
        let engine = LeaderboardEngine::builder(store.clone())
            .config(EngineConfig {
                request_timeout: Duration::from_millis(200),
                ..Default::default()
            })
            .build()
            .unwrap();
        engine.open().await.unwrap();
        store.set_latency(Duration::from_secs(5));

        // Get Page never reaches the store, so it is unaffected.
        assert!(engine.get_page(1, 10).await.is_ok());

        let err = engine.update(&EntityId::new("A")).await.unwrap_err();
        assert_matches!(err, Error::Timeout { ref operation, .. } if operation == "update");
    }
}
