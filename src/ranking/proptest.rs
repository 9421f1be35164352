//! Property-Based Tests for the Ranking Index
//!
//! # Test Properties
//!
//! 1. **Ordering**: a range is always in non-increasing score order
//! 2. **Contiguity**: ranks in a range are exactly `offset+1 ..= offset+len`
//! 3. **Bounds**: a range never returns more than `count` entries
//! 4. **Uniqueness**: one entry per entity whatever the upsert sequence
//! 5. **Idempotence**: repeating the last upsert leaves the index unchanged
//! 6. **Consistency**: `rank_of` agrees with the position in `entries`

#![cfg(test)]

use std::collections::HashMap;

use proptest::prelude::*;

use super::index::RankingIndex;
use crate::domain::ports::EntityId;

// =============================================================================
// Property Strategies
// =============================================================================

/// Upsert sequences over a small id space so updates collide often.
fn upserts_strategy() -> impl Strategy<Value = Vec<(u8, u64)>> {
    prop::collection::vec((0u8..40, 0u64..500), 0..200)
}

fn build(upserts: &[(u8, u64)]) -> RankingIndex {
    let index = RankingIndex::new();
    for (id, score) in upserts {
        index.upsert(&EntityId::new(format!("stu-{}", id)), *score);
    }
    index
}

// =============================================================================
// Range Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_range_is_ordered_contiguous_and_bounded(
        upserts in upserts_strategy(),
        offset in 0usize..60,
        count in 1usize..30,
    ) {
        let index = build(&upserts);
        let range = index.range_by_rank(offset, count);

        prop_assert!(range.len() <= count);
        prop_assert!(range.windows(2).all(|w| w[0].score >= w[1].score));
        for (i, entry) in range.iter().enumerate() {
            prop_assert_eq!(entry.rank, (offset + i + 1) as u64);
        }

        let expected = index.len().saturating_sub(offset).min(count);
        prop_assert_eq!(range.len(), expected);
    }

    #[test]
    fn prop_one_entry_per_entity_with_last_score(upserts in upserts_strategy()) {
        let index = build(&upserts);

        let mut last: HashMap<String, u64> = HashMap::new();
        for (id, score) in &upserts {
            last.insert(format!("stu-{}", id), *score);
        }

        prop_assert_eq!(index.len(), last.len());
        for (id, score) in &last {
            prop_assert_eq!(index.score_of(&EntityId::new(id.clone())), Some(*score));
        }
    }

    #[test]
    fn prop_repeating_last_upsert_is_idempotent(upserts in upserts_strategy()) {
        prop_assume!(!upserts.is_empty());
        let index = build(&upserts);
        let before = index.entries();

        let (id, score) = upserts[upserts.len() - 1];
        index.upsert(&EntityId::new(format!("stu-{}", id)), score);

        prop_assert_eq!(index.entries(), before);
    }

    #[test]
    fn prop_rank_of_agrees_with_entries(upserts in upserts_strategy()) {
        let index = build(&upserts);

        for (position, entry) in index.entries().iter().enumerate() {
            prop_assert_eq!(index.rank_of(&entry.entity_id), Some(position));
        }
    }
}
