//! Property-based tests for relERT scoring.

use ndarray::Array2;
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use aselect::InstanceKey;
use aselect::scoring::{PerformanceScorer, best_labels};

// =============================================================================
// Generators
// =============================================================================

/// Raw runtime tables: `n_candidates` candidate columns plus one baseline
/// column. Every row has at least one finite candidate runtime.
fn arb_raw_table() -> impl Strategy<Value = (Array2<f64>, usize, Vec<InstanceKey>)> {
    (1usize..8, 2usize..5).prop_flat_map(|(n_rows, n_candidates)| {
        let n_cols = n_candidates + 1;
        let cell = prop_oneof![
            4 => (1.0f64..1e6).prop_map(Some),
            1 => Just(None),
        ];
        (
            prop_vec(prop_vec(cell, n_cols), n_rows),
            prop_vec(0..n_candidates, n_rows),
            prop_vec(prop::sample::select(vec![2u32, 3, 5, 10]), n_rows),
            prop_vec(1.0f64..1e6, n_rows),
        )
            .prop_map(move |(rows, forced, dims, fallback)| {
                let n_rows = rows.len();
                let mut raw = Array2::<f64>::zeros((n_rows, n_cols));
                for (i, row) in rows.iter().enumerate() {
                    for (j, cell) in row.iter().enumerate() {
                        raw[[i, j]] = cell.unwrap_or(f64::INFINITY);
                    }
                    if !raw[[i, forced[i]]].is_finite() {
                        raw[[i, forced[i]]] = fallback[i];
                    }
                }
                let keys: Vec<InstanceKey> = dims
                    .iter()
                    .enumerate()
                    .map(|(i, &d)| InstanceKey::new(d, i as u32 + 1))
                    .collect();
                (raw, n_candidates, keys)
            })
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn row_minimum_is_exactly_one((raw, n_candidates, keys) in arb_raw_table()) {
        let scaled = PerformanceScorer::default()
            .scale_rel_ert(raw.view(), n_candidates, &keys)
            .unwrap();
        for row in scaled.rel_ert.rows() {
            let min = row.iter().take(n_candidates).copied().fold(f64::INFINITY, f64::min);
            prop_assert_eq!(min, 1.0);
        }
    }

    #[test]
    fn par10_dominates_every_finite_entry((raw, n_candidates, keys) in arb_raw_table()) {
        let scorer = PerformanceScorer::default();
        let scaled = scorer.scale_rel_ert(raw.view(), n_candidates, &keys).unwrap();

        let mut max_finite = f64::NEG_INFINITY;
        let mut n_missing = 0;
        for (i, row) in raw.rows().into_iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if v.is_finite() {
                    max_finite = max_finite.max(scaled.rel_ert[[i, j]]);
                } else {
                    n_missing += 1;
                }
            }
        }
        prop_assert_eq!(scaled.par10, scorer.par10_multiplier * max_finite);
        prop_assert_eq!(scaled.n_penalized, n_missing);
        for (i, row) in raw.rows().into_iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if v.is_finite() {
                    prop_assert!(scaled.rel_ert[[i, j]] < scaled.par10);
                } else {
                    prop_assert_eq!(scaled.rel_ert[[i, j]], scaled.par10);
                }
            }
        }
    }

    #[test]
    fn feature_cost_never_lowers_runtime((raw, _n, keys) in arb_raw_table(), cost in 0.0f64..500.0) {
        let scorer = PerformanceScorer::new(10.0, cost);
        let with_cost = scorer.apply_feature_cost(raw.view(), &keys);
        for (a, b) in with_cost.iter().zip(raw.iter()) {
            prop_assert!(a >= b);
        }
    }

    #[test]
    fn feature_cost_table_also_scales_to_one((raw, n_candidates, keys) in arb_raw_table()) {
        let scorer = PerformanceScorer::default();
        let fc = scorer.apply_feature_cost(raw.view(), &keys);
        let scaled = scorer.scale_rel_ert(fc.view(), n_candidates, &keys).unwrap();
        for row in scaled.rel_ert.rows() {
            let min = row.iter().take(n_candidates).copied().fold(f64::INFINITY, f64::min);
            prop_assert_eq!(min, 1.0);
        }
    }

    #[test]
    fn best_label_attains_row_minimum(
        (raw, n_candidates, keys) in arb_raw_table(),
        seed in any::<u64>(),
    ) {
        let scaled = PerformanceScorer::default()
            .scale_rel_ert(raw.view(), n_candidates, &keys)
            .unwrap();
        let best = best_labels(scaled.rel_ert.view(), n_candidates, &keys, seed);
        prop_assert_eq!(best.len(), keys.len());
        for (i, &b) in best.iter().enumerate() {
            prop_assert!(b < n_candidates);
            prop_assert_eq!(scaled.rel_ert[[i, b]], 1.0);
        }
        prop_assert_eq!(best, best_labels(scaled.rel_ert.view(), n_candidates, &keys, seed));
    }
}
