//! Feature selection.
//!
//! [`FeatureSelector`] wraps a learner and picks a feature subset for it on a
//! table labeled with the Best solver of each instance:
//!
//! | Strategy | Search |
//! |----------|--------|
//! | `all`    | every feature |
//! | `sffs`   | sequential floating forward search |
//! | `sfbs`   | sequential floating backward search |
//! | `ga`     | (μ + λ) genetic search, μ = 10, λ = 5 |
//! | `ga2`    | the same with a 10× larger population |
//!
//! Searches minimize the k-fold misclassification rate of the learner
//! ([`SubsetEvaluator`]). An empty result is a valid outcome.

mod genetic;
mod resample;
mod sequential;

use std::fmt;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

pub use genetic::GeneticParams;
pub use resample::{Mask, SubsetEvaluator, majority_class};
pub use sequential::SequentialParams;

use crate::error::ConfigError;
use crate::learners::LearnerFn;
use crate::utils::seeded_rng;

// =============================================================================
// Strategy
// =============================================================================

/// Feature selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    All,
    Sffs,
    Sfbs,
    Ga,
    Ga2,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::All,
        Strategy::Sffs,
        Strategy::Sfbs,
        Strategy::Ga,
        Strategy::Ga2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::All => "all",
            Strategy::Sffs => "sffs",
            Strategy::Sfbs => "sfbs",
            Strategy::Ga => "ga",
            Strategy::Ga2 => "ga2",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Inputs / outputs
// =============================================================================

/// Training table for selection: features plus a class label per row.
#[derive(Debug, Clone, Copy)]
pub struct LabeledTable<'a> {
    /// `[n_rows, n_features]`
    pub features: ArrayView2<'a, f64>,
    pub feature_names: &'a [String],
    pub labels: &'a [usize],
    pub n_classes: usize,
}

/// Named features chosen by a selection run, in table column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSubset(Vec<String>);

impl FeatureSubset {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    fn from_mask(mask: &[bool], names: &[String]) -> Self {
        Self(
            names
                .iter()
                .zip(mask)
                .filter(|&(_, &keep)| keep)
                .map(|(n, _)| n.clone())
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Selection settings shared by all strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionParams {
    /// Folds of the fitness cross-validation. Default: 5.
    pub inner_folds: usize,
    pub sequential: SequentialParams,
    pub genetic: GeneticParams,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            inner_folds: 5,
            sequential: SequentialParams::default(),
            genetic: GeneticParams::default(),
        }
    }
}

impl SelectionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inner_folds < 2 {
            return Err(ConfigError::InvalidInnerFolds(self.inner_folds));
        }
        self.genetic.validate()
    }
}

// =============================================================================
// FeatureSelector
// =============================================================================

/// Picks feature subsets for one learner.
pub struct FeatureSelector<'a, L> {
    learner: &'a L,
    params: &'a SelectionParams,
}

impl<'a, L: LearnerFn> FeatureSelector<'a, L> {
    pub fn new(learner: &'a L, params: &'a SelectionParams) -> Self {
        Self { learner, params }
    }

    /// Run `strategy` on `table`. Deterministic given `seed`.
    pub fn select(&self, table: &LabeledTable<'_>, strategy: Strategy, seed: u64) -> FeatureSubset {
        let n_features = table.features.ncols();
        if strategy == Strategy::All {
            return FeatureSubset::new(table.feature_names.to_vec());
        }

        let eval = SubsetEvaluator::new(self.learner, table, self.params.inner_folds, seed);
        let mask = match strategy {
            Strategy::All => vec![true; n_features],
            Strategy::Sffs => sequential::floating_search(
                &eval,
                &self.params.sequential,
                sequential::Direction::Forward,
            ),
            Strategy::Sfbs => sequential::floating_search(
                &eval,
                &self.params.sequential,
                sequential::Direction::Backward,
            ),
            Strategy::Ga | Strategy::Ga2 => genetic::genetic_search(
                &eval,
                &self.params.genetic,
                strategy == Strategy::Ga2,
                &mut seeded_rng(seed, &[2]),
            ),
        };

        let subset = FeatureSubset::from_mask(&mask, table.feature_names);
        tracing::debug!(
            learner = self.learner.name(),
            %strategy,
            selected = subset.len(),
            of = n_features,
            error = eval.evaluate(&mask),
            fits = eval.n_fits(),
            "feature selection finished"
        );
        subset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::TreeConfig;
    use ndarray::Array2;
    use rstest::rstest;

    fn fixture() -> (Array2<f64>, Vec<usize>, Vec<String>) {
        let n = 16;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => 1.0,
            1 => (i % 2) as f64,
            _ => i as f64,
        });
        let labels: Vec<usize> = (0..n).map(|i| usize::from(i >= n / 2)).collect();
        let names = vec!["flat".to_string(), "cycle".to_string(), "ramp".to_string()];
        (x, labels, names)
    }

    fn stump() -> TreeConfig {
        TreeConfig {
            max_depth: 1,
            min_samples_split: 2,
            min_samples_leaf: 1,
            cp: 0.0,
        }
    }

    #[test]
    fn all_returns_every_feature() {
        let (x, labels, names) = fixture();
        let table = LabeledTable {
            features: x.view(),
            feature_names: &names,
            labels: &labels,
            n_classes: 2,
        };
        let learner = stump();
        let params = SelectionParams::default();
        let subset = FeatureSelector::new(&learner, &params).select(&table, Strategy::All, 0);
        assert_eq!(subset.names(), names.as_slice());
    }

    #[rstest]
    #[case(Strategy::Sffs)]
    #[case(Strategy::Sfbs)]
    #[case(Strategy::Ga)]
    fn searches_keep_the_ramp(#[case] strategy: Strategy) {
        let (x, labels, names) = fixture();
        let table = LabeledTable {
            features: x.view(),
            feature_names: &names,
            labels: &labels,
            n_classes: 2,
        };
        let learner = stump();
        let params = SelectionParams::default();
        let selector = FeatureSelector::new(&learner, &params);
        let subset = selector.select(&table, strategy, 11);
        assert!(subset.names().contains(&"ramp".to_string()), "{strategy}: {subset:?}");
        if strategy != Strategy::Ga {
            assert_eq!(subset.names(), ["ramp".to_string()]);
        }
        assert_eq!(subset, selector.select(&table, strategy, 11));
    }

    #[test]
    fn strategy_names_round_trip_through_serde() {
        for s in Strategy::ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
        }
    }

    #[test]
    fn inner_folds_must_be_at_least_two() {
        let params = SelectionParams {
            inner_folds: 1,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ConfigError::InvalidInnerFolds(1)));
    }
}
