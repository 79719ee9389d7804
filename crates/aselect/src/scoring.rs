//! Performance scoring: relative ERT, PAR10 penalty and feature cost.
//!
//! Raw expected running times are not comparable across instances, so each
//! instance row is divided by its best finite candidate runtime. The minimising
//! candidate therefore scores exactly `1.0`. Runs that never converged are
//! replaced by a single table-wide penalty:
//!
//! ```text
//! PAR10 = multiplier × max(finite relERT over the whole table)
//! ```
//!
//! The feature-cost variant first charges every solver the same surcharge of
//! `coefficient × dimension` evaluations, then rescales independently, so it
//! has its own per-instance minima and its own PAR10 constant.
//!
//! All functions here are pure.

use ndarray::{Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;

use crate::data::InstanceKey;
use crate::error::InputError;
use crate::utils::seeded_rng;

/// Default PAR10 multiplier.
pub const DEFAULT_PAR10_MULTIPLIER: f64 = 10.0;

/// Default feature-computation surcharge per unit of dimension.
pub const DEFAULT_FEATURE_COST_PER_DIMENSION: f64 = 50.0;

// =============================================================================
// ScaledTable
// =============================================================================

/// A relERT table with every non-finite entry replaced by PAR10.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledTable {
    /// relERT values `[n_instances, n_columns]`, all finite.
    pub rel_ert: Array2<f64>,
    /// The penalty substituted for non-converged runs.
    pub par10: f64,
    /// Number of substituted entries.
    pub n_penalized: usize,
}

// =============================================================================
// PerformanceScorer
// =============================================================================

/// Turns raw runtimes into relERT scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceScorer {
    /// PAR10 multiplier applied to the largest finite relERT.
    pub par10_multiplier: f64,
    /// Feature-cost surcharge per unit of dimension.
    pub feature_cost_per_dimension: f64,
}

impl Default for PerformanceScorer {
    fn default() -> Self {
        Self {
            par10_multiplier: DEFAULT_PAR10_MULTIPLIER,
            feature_cost_per_dimension: DEFAULT_FEATURE_COST_PER_DIMENSION,
        }
    }
}

impl PerformanceScorer {
    pub fn new(par10_multiplier: f64, feature_cost_per_dimension: f64) -> Self {
        Self {
            par10_multiplier,
            feature_cost_per_dimension,
        }
    }

    /// Scale raw runtimes to relERT and substitute PAR10.
    ///
    /// The per-row minimum is taken over the first `n_candidates` columns.
    /// Any trailing columns (the baseline reference) are divided by the same
    /// minimum but never define it. PAR10 is computed from the finite entries
    /// of every column.
    ///
    /// # Errors
    ///
    /// - [`InputError::NoFiniteRuntime`] if a row has no finite candidate
    ///   runtime
    /// - [`InputError::ZeroRuntime`] if the fastest candidate runtime of a
    ///   row is zero, which leaves relERT undefined
    pub fn scale_rel_ert(
        &self,
        raw: ArrayView2<'_, f64>,
        n_candidates: usize,
        keys: &[InstanceKey],
    ) -> Result<ScaledTable, InputError> {
        debug_assert_eq!(raw.nrows(), keys.len());
        debug_assert!(n_candidates <= raw.ncols());

        let mut rel_ert = raw.to_owned();
        for (row_idx, mut row) in rel_ert.axis_iter_mut(Axis(0)).enumerate() {
            let min = row
                .iter()
                .take(n_candidates)
                .copied()
                .filter(|v| v.is_finite())
                .fold(f64::INFINITY, f64::min);
            if !min.is_finite() {
                return Err(InputError::NoFiniteRuntime(keys[row_idx]));
            }
            if min <= 0.0 {
                return Err(InputError::ZeroRuntime(keys[row_idx]));
            }
            row.mapv_inplace(|v| v / min);
        }

        let max_finite = rel_ert
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        let par10 = self.par10_multiplier * max_finite;

        let mut n_penalized = 0;
        rel_ert.mapv_inplace(|v| {
            if v.is_finite() {
                v
            } else {
                n_penalized += 1;
                par10
            }
        });

        Ok(ScaledTable {
            rel_ert,
            par10,
            n_penalized,
        })
    }

    /// Charge every solver `coefficient × dimension` extra evaluations.
    ///
    /// The surcharge is uniform per instance; non-converged runs stay
    /// non-converged.
    pub fn apply_feature_cost(
        &self,
        raw: ArrayView2<'_, f64>,
        keys: &[InstanceKey],
    ) -> Array2<f64> {
        debug_assert_eq!(raw.nrows(), keys.len());
        let mut out = raw.to_owned();
        for (mut row, key) in out.axis_iter_mut(Axis(0)).zip(keys) {
            let surcharge = self.feature_cost_per_dimension * key.dimension as f64;
            row.mapv_inplace(|v| v + surcharge);
        }
        out
    }
}

// =============================================================================
// Best labels
// =============================================================================

/// Best candidate per instance.
///
/// Ties among candidates sharing the row minimum are broken by a uniform
/// draw from a random stream keyed by `(seed, instance)`, so the label of an
/// instance depends neither on the order of the other rows nor on thread
/// scheduling.
pub fn best_labels(
    rel_ert: ArrayView2<'_, f64>,
    n_candidates: usize,
    keys: &[InstanceKey],
    seed: u64,
) -> Vec<usize> {
    rel_ert
        .axis_iter(Axis(0))
        .zip(keys)
        .map(|(row, key)| {
            let candidates: Vec<f64> = row.iter().take(n_candidates).copied().collect();
            let min = candidates.iter().copied().fold(f64::INFINITY, f64::min);
            let tied: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|&(_, &v)| v == min)
                .map(|(idx, _)| idx)
                .collect();
            if tied.len() == 1 {
                tied[0]
            } else {
                let mut rng = seeded_rng(seed, &key.seed_stream());
                *tied.choose(&mut rng).unwrap_or(&0)
            }
        })
        .collect()
}
