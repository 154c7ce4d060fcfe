//! Property-Based Tests for Region Selection
//!
//! # Test Strategies
//!
//! - **Minimality**: the chosen region never carries more traffic than any other
//! - **Tie narrowing**: among equally loaded regions the soonest reset wins
//! - **Snapshot math**: traffic rate always lands in `[0, 1]`
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib rate_limit::proptests
//! ```

use proptest::prelude::*;

use crate::rate_limit::quota::{QuotaSnapshot, TrafficSample};
use crate::rate_limit::selector::select_least_loaded;
use crate::rate_limit::tiebreak::RandomTieBreaker;

// Helper: snapshots with remaining <= capacity
fn arb_snapshot() -> impl Strategy<Value = QuotaSnapshot> {
    (1u32..200, 0u64..60_000).prop_flat_map(|(capacity, ms_before_next)| {
        (0..=capacity).prop_map(move |remaining| QuotaSnapshot {
            remaining,
            capacity,
            ms_before_next,
        })
    })
}

fn arb_samples() -> impl Strategy<Value = Vec<TrafficSample>> {
    prop::collection::vec(arb_snapshot(), 1..8).prop_map(|snapshots| {
        snapshots
            .iter()
            .enumerate()
            .map(|(i, s)| TrafficSample::from_snapshot(format!("region-{}", i), s))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_selection_is_minimal(samples in arb_samples(), seed in any::<u64>()) {
        let breaker = RandomTieBreaker::with_seed(seed);
        let chosen = select_least_loaded(&samples, &breaker).unwrap();

        for other in &samples {
            prop_assert!(samples[chosen].traffic_rate <= other.traffic_rate);
        }
    }

    #[test]
    fn prop_ties_prefer_soonest_reset(samples in arb_samples(), seed in any::<u64>()) {
        let breaker = RandomTieBreaker::with_seed(seed);
        let chosen = &samples[select_least_loaded(&samples, &breaker).unwrap()];

        for other in samples.iter().filter(|s| s.traffic_rate == chosen.traffic_rate) {
            prop_assert!(chosen.ms_before_next <= other.ms_before_next);
        }
    }

    #[test]
    fn prop_traffic_rate_bounded(snapshot in arb_snapshot()) {
        let rate = snapshot.traffic_rate();
        prop_assert!((0.0..=1.0).contains(&rate));
        if snapshot.remaining == snapshot.capacity {
            prop_assert_eq!(rate, 0.0);
        }
    }
}
