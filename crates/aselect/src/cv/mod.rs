//! Leave-one-instance-out cross-validation.
//!
//! [`CrossValidator::evaluate`] runs one (learner, strategy) pair through
//! LOOCV for every requested [`SelectorFamily`]. Per fold:
//!
//! 1. pick the feature subset (per fold on the `N − 1` training rows, or
//!    once on all rows, see [`SelectionScope`])
//! 2. fit the family's models on the training rows
//! 3. choose a solver for the held-out row and read its relERT
//!
//! Folds are independent and run on the run's worker pool; results are
//! merged in instance order.

mod family;
mod pairwise;

use ndarray::Axis;
use serde::{Deserialize, Serialize};

pub use family::SelectorFamily;
pub use pairwise::PairwiseMatrix;

use crate::aggregate::FailureReason;
use crate::data::{InstanceKey, MetaDataset};
use crate::error::FoldError;
use crate::learners::LearnerFn;
use crate::selection::{FeatureSelector, FeatureSubset, LabeledTable, SelectionParams, Strategy};
use crate::utils::{Parallelism, derive_seed};
use family::FoldData;

// =============================================================================
// Folds
// =============================================================================

/// Where feature selection sees data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionScope {
    /// One selection over all instances, shared by every fold.
    Global,
    /// One selection per fold over its training instances only.
    #[default]
    PerFold,
}

/// One LOOCV split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub held_out: usize,
    /// Every other row, ascending.
    pub train: Vec<usize>,
}

/// The `n` leave-one-out folds, in row order.
pub fn leave_one_out(n: usize) -> Vec<Fold> {
    (0..n)
        .map(|held_out| Fold {
            held_out,
            train: (0..n).filter(|&r| r != held_out).collect(),
        })
        .collect()
}

// =============================================================================
// Results
// =============================================================================

/// Solver chosen for one held-out instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    #[serde(flatten)]
    pub key: InstanceKey,
    pub solver: String,
    pub rel_ert: f64,
    pub rel_ert_fc: f64,
}

/// Feature subset used in one fold, or globally when `held_out` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSubset {
    pub held_out: Option<InstanceKey>,
    pub features: FeatureSubset,
}

/// Every subset a (learner, strategy) pair selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetRecord {
    pub learner: String,
    pub strategy: Strategy,
    pub scope: SelectionScope,
    pub subsets: Vec<FoldSubset>,
}

impl SubsetRecord {
    /// True if any selection came back empty.
    pub fn any_empty(&self) -> bool {
        self.subsets.iter().any(|s| s.features.is_empty())
    }
}

/// LOOCV result of one family.
#[derive(Debug, Clone)]
pub struct FamilyEvaluation {
    pub family: SelectorFamily,
    /// `N` outcomes in instance order, or why there are none.
    pub result: Result<Vec<SelectionOutcome>, FailureReason>,
}

/// LOOCV results of one (learner, strategy) pair.
#[derive(Debug, Clone)]
pub struct PairEvaluation {
    pub learner: String,
    pub strategy: Strategy,
    pub subsets: SubsetRecord,
    pub families: Vec<FamilyEvaluation>,
}

// =============================================================================
// CrossValidator
// =============================================================================

/// Per-fold work product, before merging.
struct FoldRun {
    subset: Option<FeatureSubset>,
    /// One entry per family; `None` when the fold's subset was empty.
    choices: Option<Vec<Result<usize, FoldError>>>,
}

/// Runs LOOCV over one dataset.
pub struct CrossValidator<'a> {
    data: &'a MetaDataset,
    selection: &'a SelectionParams,
    scope: SelectionScope,
    parallelism: Parallelism,
}

impl<'a> CrossValidator<'a> {
    pub fn new(
        data: &'a MetaDataset,
        selection: &'a SelectionParams,
        scope: SelectionScope,
        parallelism: Parallelism,
    ) -> Self {
        Self {
            data,
            selection,
            scope,
            parallelism,
        }
    }

    /// Evaluate `families` for one (learner, strategy) pair.
    ///
    /// Deterministic given `pair_seed`, whatever the parallelism.
    #[tracing::instrument(skip_all, fields(learner = learner.name(), %strategy))]
    pub fn evaluate<L: LearnerFn>(
        &self,
        learner: &L,
        strategy: Strategy,
        families: &[SelectorFamily],
        pair_seed: u64,
    ) -> PairEvaluation {
        let data = self.data;
        let folds = leave_one_out(data.n_instances());

        let global = match self.scope {
            SelectionScope::Global => {
                let all: Vec<usize> = (0..data.n_instances()).collect();
                Some(self.select(learner, strategy, &all, derive_seed(pair_seed, &[1])))
            }
            SelectionScope::PerFold => None,
        };

        let runs: Vec<FoldRun> = self.parallelism.maybe_par_map(folds, |fold| {
            let fold_seed = derive_seed(pair_seed, &[0, fold.held_out as u64]);
            let (subset, own) = match &global {
                Some(subset) => (subset.clone(), false),
                None => (
                    self.select(learner, strategy, &fold.train, derive_seed(fold_seed, &[3])),
                    true,
                ),
            };
            let choices = (!subset.is_empty())
                .then(|| self.run_fold(learner, families, &fold, &subset, fold_seed));
            tracing::debug!(
                held_out = %data.keys()[fold.held_out],
                features = subset.len(),
                "fold finished"
            );
            FoldRun {
                subset: own.then_some(subset),
                choices,
            }
        });

        let subsets = SubsetRecord {
            learner: learner.name().to_string(),
            strategy,
            scope: self.scope,
            subsets: match global {
                Some(features) => vec![FoldSubset {
                    held_out: None,
                    features,
                }],
                None => runs
                    .iter()
                    .enumerate()
                    .map(|(row, run)| FoldSubset {
                        held_out: Some(data.keys()[row]),
                        features: run.subset.clone().unwrap_or_default(),
                    })
                    .collect(),
            },
        };

        let families = families
            .iter()
            .enumerate()
            .map(|(f, &family)| FamilyEvaluation {
                family,
                result: if subsets.any_empty() {
                    Err(FailureReason::EmptyFeatureSet)
                } else {
                    self.collect_outcomes(&runs, f)
                },
            })
            .collect();

        PairEvaluation {
            learner: learner.name().to_string(),
            strategy,
            subsets,
            families,
        }
    }

    fn select<L: LearnerFn>(
        &self,
        learner: &L,
        strategy: Strategy,
        rows: &[usize],
        seed: u64,
    ) -> FeatureSubset {
        let features = self.data.features().select(Axis(0), rows);
        let labels: Vec<usize> = rows.iter().map(|&r| self.data.best()[r]).collect();
        let table = LabeledTable {
            features: features.view(),
            feature_names: self.data.feature_names(),
            labels: &labels,
            n_classes: self.data.n_solvers(),
        };
        FeatureSelector::new(learner, self.selection).select(&table, strategy, seed)
    }

    fn run_fold<L: LearnerFn>(
        &self,
        learner: &L,
        families: &[SelectorFamily],
        fold: &Fold,
        subset: &FeatureSubset,
        fold_seed: u64,
    ) -> Vec<Result<usize, FoldError>> {
        let columns = self.data.feature_indices(subset.names());
        let fold_data = FoldData {
            data: self.data,
            train: &fold.train,
            held_out: fold.held_out,
            x_train: self.data.feature_matrix(&fold.train, &columns),
            x_test: self.data.feature_row(fold.held_out, &columns),
            seed: fold_seed,
        };
        families
            .iter()
            .map(|family| family.choose(learner, &fold_data))
            .collect()
    }

    /// Outcomes of family `f` in instance order; the first fold error in
    /// instance order fails the family.
    fn collect_outcomes(
        &self,
        runs: &[FoldRun],
        f: usize,
    ) -> Result<Vec<SelectionOutcome>, FailureReason> {
        let data = self.data;
        let mut outcomes = Vec::with_capacity(runs.len());
        for (row, run) in runs.iter().enumerate() {
            let choice = match run.choices.as_ref().map(|c| &c[f]) {
                Some(Ok(choice)) => *choice,
                Some(Err(err)) => return Err(FailureReason::Fold(err.clone())),
                None => return Err(FailureReason::EmptyFeatureSet),
            };
            outcomes.push(SelectionOutcome {
                key: data.keys()[row],
                solver: data.solvers()[choice].clone(),
                rel_ert: data.rel_ert()[[row, choice]],
                rel_ert_fc: data.rel_ert_fc()[[row, choice]],
            });
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::TreeConfig;
    use crate::testing::{OracleLearner, SyntheticSpec, synthetic_dataset};

    #[test]
    fn held_out_row_never_trains() {
        for fold in leave_one_out(7) {
            assert_eq!(fold.train.len(), 6);
            assert!(!fold.train.contains(&fold.held_out));
        }
        assert!(leave_one_out(0).is_empty());
    }

    #[test]
    fn one_outcome_per_instance_in_instance_order() {
        let data = synthetic_dataset(&SyntheticSpec::default());
        let selection = SelectionParams::default();
        let cv = CrossValidator::new(&data, &selection, SelectionScope::PerFold, Parallelism::Sequential);
        let learner = TreeConfig::default();
        let eval = cv.evaluate(&learner, Strategy::All, &SelectorFamily::ALL, 9);

        assert_eq!(eval.families.len(), 3);
        for fam in &eval.families {
            let outcomes = fam.result.as_ref().expect("tree fits never fail here");
            assert_eq!(outcomes.len(), data.n_instances());
            let keys: Vec<_> = outcomes.iter().map(|o| o.key).collect();
            assert_eq!(keys, data.keys());
            assert!(outcomes.iter().all(|o| o.rel_ert >= 1.0));
        }
        assert_eq!(eval.subsets.subsets.len(), data.n_instances());
    }

    #[test]
    fn parallel_matches_sequential() {
        let data = synthetic_dataset(&SyntheticSpec::default());
        let selection = SelectionParams::default();
        let learner = TreeConfig::default();
        let run = |p| {
            let cv = CrossValidator::new(&data, &selection, SelectionScope::PerFold, p);
            let eval = cv.evaluate(&learner, Strategy::Sffs, &SelectorFamily::ALL, 4);
            let outcomes: Vec<_> = eval
                .families
                .into_iter()
                .map(|f| f.result.map_err(|e| e.to_string()))
                .collect();
            (eval.subsets, outcomes)
        };
        let sequential = run(Parallelism::Sequential);
        let parallel = rayon::ThreadPoolBuilder::new()
            .num_threads(3)
            .build()
            .unwrap()
            .install(|| run(Parallelism::Parallel));
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn oracle_regressors_agree_with_pairwise() {
        let data = synthetic_dataset(&SyntheticSpec::default());
        let selection = SelectionParams::default();
        let cv = CrossValidator::new(&data, &selection, SelectionScope::Global, Parallelism::Sequential);
        let oracle = OracleLearner::new(&data);
        let eval = cv.evaluate(
            &oracle,
            Strategy::All,
            &[SelectorFamily::Regression, SelectorFamily::Pairwise],
            1,
        );
        let regression = eval.families[0].result.as_ref().unwrap();
        let pairwise = eval.families[1].result.as_ref().unwrap();
        assert_eq!(regression, pairwise);
        assert!(regression.iter().all(|o| o.rel_ert == 1.0));
        assert_eq!(eval.subsets.subsets.len(), 1);
        assert_eq!(eval.subsets.subsets[0].held_out, None);
    }
}
