//! The joined, scored meta-learning table.
//!
//! [`MetaDataset`] is what every evaluation stage reads: features and both
//! relERT variants aligned row by row on [`InstanceKey`], plus the Best label
//! of each instance. It is built once per run and never mutated; folds
//! borrow it and select rows by index.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::Serialize;

use super::{FeatureTable, InstanceKey, PerformanceTable};
use crate::error::InputError;
use crate::scoring::{PerformanceScorer, best_labels};

// =============================================================================
// AssemblySpec
// =============================================================================

/// What to take from the input tables.
#[derive(Debug, Clone)]
pub struct AssemblySpec<'a> {
    /// Candidate solvers, in the fixed order used for tie-breaking.
    pub solvers: &'a [String],
    /// Reference solver column, not a candidate.
    pub baseline: &'a str,
    /// Dimensions to keep. Empty keeps all.
    pub dimensions: &'a [u32],
    /// Function ids to keep. Empty keeps all.
    pub function_ids: &'a [u32],
    pub scorer: PerformanceScorer,
    /// Seed for Best-label tie-breaking.
    pub seed: u64,
}

impl AssemblySpec<'_> {
    fn accepts(&self, key: &InstanceKey) -> bool {
        (self.dimensions.is_empty() || self.dimensions.contains(&key.dimension))
            && (self.function_ids.is_empty() || self.function_ids.contains(&key.function_id))
    }
}

// =============================================================================
// BaselineScores
// =============================================================================

/// relERT of the baseline solver, aligned with the dataset rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineScores {
    pub name: String,
    pub rel_ert: Vec<f64>,
    pub rel_ert_fc: Vec<f64>,
}

// =============================================================================
// MetaDataset
// =============================================================================

/// Features, scores and labels of every instance.
#[derive(Debug, Clone)]
pub struct MetaDataset {
    keys: Vec<InstanceKey>,
    feature_names: Vec<String>,
    /// `[n_instances, n_features]`
    features: Array2<f64>,
    solvers: Vec<String>,
    /// `[n_instances, n_solvers]`
    rel_ert: Array2<f64>,
    /// `[n_instances, n_solvers]`
    rel_ert_fc: Array2<f64>,
    best: Vec<usize>,
    baseline: BaselineScores,
    par10: f64,
    par10_fc: f64,
}

impl MetaDataset {
    /// Join the tables on instance key and score them.
    ///
    /// Both tables are first restricted to the configured dimensions and
    /// function ids. The remaining key sets must be identical.
    ///
    /// # Errors
    ///
    /// - [`InputError::InstanceMismatch`] if the tables disagree on instances
    /// - [`InputError::MissingBaseline`] / [`InputError::MissingSolver`] for
    ///   absent columns
    /// - [`InputError::NoFiniteRuntime`] if an instance was never solved
    /// - [`InputError::ZeroRuntime`] if an instance's fastest runtime is zero
    pub fn assemble(
        features: &FeatureTable,
        performance: &PerformanceTable,
        spec: &AssemblySpec<'_>,
    ) -> Result<Self, InputError> {
        let features = features.retain(|k| spec.accepts(k));
        let performance = performance.retain(|k| spec.accepts(k));

        let feature_keys: BTreeSet<InstanceKey> = features.keys().iter().copied().collect();
        let perf_keys: BTreeSet<InstanceKey> = performance.keys().iter().copied().collect();
        if feature_keys != perf_keys {
            return Err(InputError::InstanceMismatch {
                features_only: feature_keys.difference(&perf_keys).copied().collect(),
                performance_only: perf_keys.difference(&feature_keys).copied().collect(),
            });
        }
        if feature_keys.is_empty() {
            return Err(InputError::Empty);
        }

        let baseline_col = performance
            .solver_index(spec.baseline)
            .ok_or_else(|| InputError::MissingBaseline(spec.baseline.to_string()))?;
        let mut columns = Vec::with_capacity(spec.solvers.len() + 1);
        for solver in spec.solvers {
            columns.push(
                performance
                    .solver_index(solver)
                    .ok_or_else(|| InputError::MissingSolver(solver.clone()))?,
            );
        }
        columns.push(baseline_col);

        // Both tables are sorted by key, so rows already line up.
        let keys = features.keys().to_vec();
        let n_solvers = spec.solvers.len();
        let raw = performance.ert().select(Axis(1), &columns);

        let scaled = spec.scorer.scale_rel_ert(raw.view(), n_solvers, &keys)?;
        let raw_fc = spec.scorer.apply_feature_cost(raw.view(), &keys);
        let scaled_fc = spec.scorer.scale_rel_ert(raw_fc.view(), n_solvers, &keys)?;

        let best = best_labels(scaled.rel_ert.view(), n_solvers, &keys, spec.seed);

        let baseline = BaselineScores {
            name: spec.baseline.to_string(),
            rel_ert: scaled.rel_ert.column(n_solvers).to_vec(),
            rel_ert_fc: scaled_fc.rel_ert.column(n_solvers).to_vec(),
        };

        tracing::debug!(
            n_instances = keys.len(),
            n_features = features.n_features(),
            n_solvers,
            par10 = scaled.par10,
            par10_fc = scaled_fc.par10,
            penalized = scaled.n_penalized,
            "assembled meta dataset"
        );

        let candidate_cols: Vec<usize> = (0..n_solvers).collect();
        Ok(Self {
            keys,
            feature_names: features.names().to_vec(),
            features: features.values().to_owned(),
            solvers: spec.solvers.to_vec(),
            rel_ert: scaled.rel_ert.select(Axis(1), &candidate_cols),
            rel_ert_fc: scaled_fc.rel_ert.select(Axis(1), &candidate_cols),
            best,
            baseline,
            par10: scaled.par10,
            par10_fc: scaled_fc.par10,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn keys(&self) -> &[InstanceKey] {
        &self.keys
    }

    pub fn n_instances(&self) -> usize {
        self.keys.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Feature matrix `[n_instances, n_features]`.
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    /// Candidate solvers in fixed tie-break order.
    pub fn solvers(&self) -> &[String] {
        &self.solvers
    }

    pub fn n_solvers(&self) -> usize {
        self.solvers.len()
    }

    /// relERT `[n_instances, n_solvers]`.
    pub fn rel_ert(&self) -> ArrayView2<'_, f64> {
        self.rel_ert.view()
    }

    /// relERT including the feature-cost surcharge `[n_instances, n_solvers]`.
    pub fn rel_ert_fc(&self) -> ArrayView2<'_, f64> {
        self.rel_ert_fc.view()
    }

    /// Best candidate index per instance.
    pub fn best(&self) -> &[usize] {
        &self.best
    }

    pub fn baseline(&self) -> &BaselineScores {
        &self.baseline
    }

    pub fn par10(&self) -> f64 {
        self.par10
    }

    pub fn par10_fc(&self) -> f64 {
        self.par10_fc
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Column indices of named features, in the given order.
    ///
    /// Unknown names are skipped.
    pub fn feature_indices(&self, names: &[String]) -> Vec<usize> {
        names
            .iter()
            .filter_map(|n| self.feature_names.iter().position(|f| f == n))
            .collect()
    }

    /// Feature sub-matrix for the given rows and columns.
    pub fn feature_matrix(&self, rows: &[usize], columns: &[usize]) -> Array2<f64> {
        self.features.select(Axis(0), rows).select(Axis(1), columns)
    }

    /// One instance's feature values restricted to `columns`.
    pub fn feature_row(&self, row: usize, columns: &[usize]) -> Array1<f64> {
        let full: ArrayView1<'_, f64> = self.features.row(row);
        columns.iter().map(|&c| full[c]).collect()
    }

    /// Per-instance virtual-best relERT. Always `1.0` by construction.
    pub fn virtual_best(&self) -> Vec<f64> {
        self.rel_ert
            .axis_iter(Axis(0))
            .map(|row| row.iter().copied().fold(f64::INFINITY, f64::min))
            .collect()
    }

    /// Mean relERT of each candidate solver over all instances.
    pub fn solver_means(&self) -> Vec<f64> {
        self.rel_ert
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }
}
