//! Gradient-boosted trees.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis, s};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::tree::{GainParams, GrowerParams, Tree, TreeGrower};
use super::{DerivedParams, LearnerFn, Scorer, Target};
use crate::error::{ConfigError, FitError};

// =============================================================================
// Loss
// =============================================================================

/// Training loss, chosen by the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loss {
    /// Squared error on one output.
    /// - Gradient: `pred - y`
    /// - Hessian: `1`
    Squared,
    /// Softmax cross-entropy over one output per class.
    /// - Gradient: `p_k - y_k`
    /// - Hessian: `2 p_k (1 - p_k)`
    Softmax,
}

impl Loss {
    const HESS_MIN: f64 = 1e-16;

    fn base_score(self, targets: &Array2<f64>) -> Vec<f64> {
        match self {
            Loss::Squared => targets
                .mean_axis(Axis(0))
                .map(|m| m.to_vec())
                .unwrap_or_else(|| vec![0.0; targets.ncols()]),
            Loss::Softmax => vec![0.0; targets.ncols()],
        }
    }

    /// Fill `grads` and `hess` (`[n_rows, n_outputs]`) from raw predictions.
    fn compute_gradients(
        self,
        predictions: &Array2<f64>,
        targets: &Array2<f64>,
        grads: &mut Array2<f64>,
        hess: &mut Array2<f64>,
    ) {
        match self {
            Loss::Squared => {
                grads.assign(&(predictions - targets));
                hess.fill(1.0);
            }
            Loss::Softmax => {
                for (i, pred_row) in predictions.outer_iter().enumerate() {
                    let max = pred_row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let exp: Vec<f64> = pred_row.iter().map(|&v| (v - max).exp()).collect();
                    let sum: f64 = exp.iter().sum();
                    for (k, e) in exp.iter().enumerate() {
                        let p = e / sum;
                        grads[[i, k]] = p - targets[[i, k]];
                        hess[[i, k]] = (2.0 * p * (1.0 - p)).max(Self::HESS_MIN);
                    }
                }
            }
        }
    }
}

// =============================================================================
// BoostedConfig
// =============================================================================

/// Gradient-boosted regression trees.
///
/// Regression boosts squared error from the target mean. Classification
/// boosts the softmax loss and grows one tree per class per round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedConfig {
    /// Boosting rounds. Default: 50.
    pub n_rounds: usize,
    /// Shrinkage. Default: 0.3.
    pub learning_rate: f64,
    /// Maximum tree depth. Default: 6.
    pub max_depth: usize,
    /// L2 regularization on leaf weights. Default: 1.0.
    pub reg_lambda: f64,
    /// Minimum hessian sum per child. Default: 1.0.
    pub min_child_weight: f64,
    /// Minimum split gain. Default: 0.0.
    pub min_gain: f64,
}

impl Default for BoostedConfig {
    fn default() -> Self {
        Self {
            n_rounds: 50,
            learning_rate: 0.3,
            max_depth: 6,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            min_gain: 0.0,
        }
    }
}

impl BoostedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_rounds == 0 {
            return Err(ConfigError::OutOfRange {
                field: "boosted.n_rounds",
                range: ">= 1",
                value: 0.0,
            });
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "boosted.learning_rate",
                range: "(0, 1]",
                value: self.learning_rate,
            });
        }
        for (field, value) in [
            ("boosted.reg_lambda", self.reg_lambda),
            ("boosted.min_child_weight", self.min_child_weight),
            ("boosted.min_gain", self.min_gain),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    range: ">= 0",
                    value,
                });
            }
        }
        Ok(())
    }
}

impl LearnerFn for BoostedConfig {
    type Model = BoostedModel;

    fn name(&self) -> &str {
        "boosted"
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        _derived: &DerivedParams,
        seed: u64,
    ) -> Result<BoostedModel, FitError> {
        let loss = match target {
            Target::Values(_) => Loss::Squared,
            Target::Classes { .. } => Loss::Softmax,
        };
        let y = target.to_matrix();
        let (n_rows, n_outputs) = y.dim();
        let rows: Vec<usize> = (0..n_rows).collect();

        let params = GrowerParams {
            gain: GainParams {
                reg_lambda: self.reg_lambda,
                min_gain: self.min_gain,
                min_child_weight: self.min_child_weight,
                min_samples_leaf: 1,
            },
            max_depth: self.max_depth,
            min_samples_split: 2,
            features_per_node: None,
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let base_score = loss.base_score(&y);
        let mut predictions = Array2::from_shape_fn((n_rows, n_outputs), |(_, k)| base_score[k]);
        let mut grads = Array2::zeros((n_rows, n_outputs));
        let mut hess = Array2::zeros((n_rows, n_outputs));
        let mut rounds = Vec::with_capacity(self.n_rounds);

        for _ in 0..self.n_rounds {
            loss.compute_gradients(&predictions, &y, &mut grads, &mut hess);
            let mut round = Vec::with_capacity(n_outputs);
            for k in 0..n_outputs {
                let g = grads.slice(s![.., k..k + 1]);
                let h = hess.slice(s![.., k..k + 1]);
                let tree = TreeGrower::new(x.view(), g, h, &params).grow(&rows, &mut rng);
                for (i, row) in x.outer_iter().enumerate() {
                    let leaf = tree.traverse_to_leaf(row);
                    predictions[[i, k]] += self.learning_rate * tree.leaf_value(leaf)[0];
                }
                round.push(tree);
            }
            rounds.push(round);
        }

        Ok(BoostedModel {
            base_score,
            learning_rate: self.learning_rate,
            rounds,
        })
    }
}

// =============================================================================
// BoostedModel
// =============================================================================

/// Fitted boosted ensemble. Outputs are raw scores (logits for
/// classification).
#[derive(Debug, Clone)]
pub struct BoostedModel {
    base_score: Vec<f64>,
    learning_rate: f64,
    /// One tree per output per round.
    rounds: Vec<Vec<Tree>>,
}

impl BoostedModel {
    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }
}

impl Scorer for BoostedModel {
    fn n_outputs(&self) -> usize {
        self.base_score.len()
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut out = self.base_score.clone();
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                tree.accumulate(row, self.learning_rate, &mut out[k..k + 1]);
            }
        }
        out
    }
}
