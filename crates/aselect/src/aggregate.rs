//! Result aggregation and the run report.
//!
//! [`ResultAggregator`] collects the per-family outcomes of every
//! (learner, strategy) pair, turns them into [`CombinationResult`]s or
//! [`CombinationFailure`]s, and ranks the successful combinations by mean
//! relERT. [`RunReport`] is the serializable summary of a run.
//!
//! Non-finite numbers (e.g. the mean of an empty set) are written as JSON
//! `null`.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::cv::{PairEvaluation, SelectionOutcome, SelectorFamily, SubsetRecord};
use crate::data::MetaDataset;
use crate::error::FoldError;
use crate::selection::Strategy;
use crate::utils::mean;

// =============================================================================
// Failures
// =============================================================================

/// Why a combination produced no result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    /// Feature selection returned no features.
    #[error("empty feature set")]
    EmptyFeatureSet,
    /// A model fit failed in one of the folds.
    #[error(transparent)]
    Fold(#[from] FoldError),
}

impl FailureReason {
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::EmptyFeatureSet => "empty_feature_set",
            FailureReason::Fold(_) => "fold_error",
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FailureReason", 3)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        match self {
            FailureReason::Fold(err) => s.serialize_field("held_out", &Some(err.held_out))?,
            FailureReason::EmptyFeatureSet => s.serialize_field("held_out", &None::<()>)?,
        }
        s.end()
    }
}

/// A combination that was skipped or aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationFailure {
    pub name: String,
    pub reason: FailureReason,
}

// =============================================================================
// CombinationResult
// =============================================================================

/// `"{family}.{learner}.{strategy}"`, e.g. `pairwise.forest.sffs`.
pub fn combination_name(family: SelectorFamily, learner: &str, strategy: Strategy) -> String {
    format!("{family}.{learner}.{strategy}")
}

/// LOOCV outcome of one (family, learner, strategy) combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationResult {
    pub name: String,
    pub family: SelectorFamily,
    pub learner: String,
    pub strategy: Strategy,
    pub mean_rel_ert: f64,
    pub mean_rel_ert_fc: f64,
    /// Fraction of the baseline-to-virtual-best gap closed, `(sbs − m) / (sbs − 1)`.
    /// `None` when the baseline already is virtual best.
    pub gap_closed: Option<f64>,
    /// One row per instance, in instance order.
    pub outcomes: Vec<SelectionOutcome>,
}

// =============================================================================
// ResultAggregator
// =============================================================================

/// Collects combination results for one run.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    /// Baseline mean relERT, the reference for `gap_closed`.
    baseline_mean: f64,
    results: Vec<CombinationResult>,
    failures: Vec<CombinationFailure>,
    subsets: Vec<SubsetRecord>,
}

impl ResultAggregator {
    pub fn new(baseline_mean: f64) -> Self {
        Self {
            baseline_mean,
            ..Default::default()
        }
    }

    /// Record every family of one (learner, strategy) pair.
    pub fn add(&mut self, evaluation: PairEvaluation) {
        let PairEvaluation {
            learner,
            strategy,
            subsets,
            families,
        } = evaluation;

        for family in families {
            let name = combination_name(family.family, &learner, strategy);
            match family.result {
                Ok(outcomes) => {
                    let rel: Vec<f64> = outcomes.iter().map(|o| o.rel_ert).collect();
                    let rel_fc: Vec<f64> = outcomes.iter().map(|o| o.rel_ert_fc).collect();
                    let mean_rel_ert = mean(&rel);
                    self.results.push(CombinationResult {
                        name,
                        family: family.family,
                        learner: learner.clone(),
                        strategy,
                        mean_rel_ert,
                        mean_rel_ert_fc: mean(&rel_fc),
                        gap_closed: gap_closed(self.baseline_mean, mean_rel_ert),
                        outcomes,
                    });
                }
                Err(reason) => {
                    tracing::warn!(combination = %name, %reason, "combination skipped");
                    self.failures.push(CombinationFailure { name, reason });
                }
            }
        }
        self.subsets.push(subsets);
    }

    /// Successful combinations in insertion order.
    pub fn results(&self) -> &[CombinationResult] {
        &self.results
    }

    pub fn failures(&self) -> &[CombinationFailure] {
        &self.failures
    }

    pub fn get(&self, name: &str) -> Option<&CombinationResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Successful combinations by ascending mean relERT; ties keep insertion
    /// order.
    pub fn ranking(&self) -> Vec<&CombinationResult> {
        let mut ranked: Vec<&CombinationResult> = self.results.iter().collect();
        ranked.sort_by(|a, b| a.mean_rel_ert.total_cmp(&b.mean_rel_ert));
        ranked
    }

    /// Lowest mean relERT per family.
    pub fn best_per_family(&self) -> BTreeMap<SelectorFamily, &CombinationResult> {
        let mut best = BTreeMap::new();
        for result in self.ranking() {
            best.entry(result.family).or_insert(result);
        }
        best
    }

    /// Lowest mean relERT overall.
    pub fn best(&self) -> Option<&CombinationResult> {
        self.ranking().into_iter().next()
    }

    /// Build the run report.
    pub fn finish(self, data: &MetaDataset) -> RunReport {
        let baseline = data.baseline();
        let ranking = self
            .ranking()
            .into_iter()
            .enumerate()
            .map(|(i, r)| RankedCombination {
                rank: i + 1,
                name: r.name.clone(),
                mean_rel_ert: r.mean_rel_ert,
                mean_rel_ert_fc: r.mean_rel_ert_fc,
                gap_closed: r.gap_closed,
            })
            .collect();
        let best_per_family = self
            .best_per_family()
            .into_iter()
            .map(|(family, r)| (family, r.name.clone()))
            .collect();
        let best = self.best().map(|r| r.name.clone());

        RunReport {
            n_instances: data.n_instances(),
            solvers: data.solvers().to_vec(),
            par10: data.par10(),
            par10_fc: data.par10_fc(),
            baseline: BaselineSummary {
                name: baseline.name.clone(),
                mean_rel_ert: mean(&baseline.rel_ert),
                mean_rel_ert_fc: mean(&baseline.rel_ert_fc),
            },
            virtual_best: mean(&data.virtual_best()),
            solver_means: data
                .solvers()
                .iter()
                .cloned()
                .zip(data.solver_means())
                .collect(),
            ranking,
            best_per_family,
            best,
            combinations: self.results,
            failures: self.failures,
            feature_subsets: self.subsets,
        }
    }
}

fn gap_closed(baseline_mean: f64, mean_rel_ert: f64) -> Option<f64> {
    let gap = baseline_mean - 1.0;
    (gap.is_finite() && gap > 0.0).then(|| (baseline_mean - mean_rel_ert) / gap)
}

// =============================================================================
// RunReport
// =============================================================================

/// Baseline solver reference scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineSummary {
    pub name: String,
    pub mean_rel_ert: f64,
    pub mean_rel_ert_fc: f64,
}

/// One line of the ranked summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCombination {
    pub rank: usize,
    pub name: String,
    pub mean_rel_ert: f64,
    pub mean_rel_ert_fc: f64,
    pub gap_closed: Option<f64>,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub n_instances: usize,
    pub solvers: Vec<String>,
    pub par10: f64,
    pub par10_fc: f64,
    pub baseline: BaselineSummary,
    /// Mean relERT of the virtual best solver, `1.0` by construction.
    pub virtual_best: f64,
    /// Mean relERT of each candidate solver.
    pub solver_means: BTreeMap<String, f64>,
    pub ranking: Vec<RankedCombination>,
    pub best_per_family: BTreeMap<SelectorFamily, String>,
    pub best: Option<String>,
    pub combinations: Vec<CombinationResult>,
    pub failures: Vec<CombinationFailure>,
    pub feature_subsets: Vec<SubsetRecord>,
}

impl RunReport {
    pub fn combination(&self, name: &str) -> Option<&CombinationResult> {
        self.combinations.iter().find(|c| c.name == name)
    }
}
