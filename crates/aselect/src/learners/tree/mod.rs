//! Decision trees.
//!
//! [`TreeGrower`] and [`Tree`] are shared by the single-tree, forest and
//! boosted families. [`TreeConfig`] is the single CART-style tree.

mod gain;
mod grower;
mod node;

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

pub use gain::GainParams;
pub use grower::{GrowerParams, TreeGrower};
pub use node::{NodeId, Tree};

use super::{DerivedParams, LearnerFn, Scorer, Target};
use crate::error::{ConfigError, FitError};

/// Squared-loss gradients of a zero prediction: `g = -y`, `h = 1`.
pub(crate) fn squared_loss_from_zero(targets: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    (targets.mapv(|y| -y), Array2::ones(targets.dim()))
}

// =============================================================================
// TreeConfig
// =============================================================================

/// Single decision tree.
///
/// Regression trees minimize squared error; classification trees fit the
/// one-hot class indicators, which makes the split criterion the Gini
/// impurity decrease and the leaf values the class frequencies.
///
/// Growth stops at a node when it has fewer than `min_samples_split` rows,
/// when a child would get fewer than `min_samples_leaf` rows, or when the
/// best split reduces the error by less than `cp` times the root error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum depth. Default: 30.
    pub max_depth: usize,
    /// Minimum rows in a node to attempt a split. Default: 20.
    pub min_samples_split: usize,
    /// Minimum rows in each child. Default: 7.
    pub min_samples_leaf: usize,
    /// Complexity parameter. Default: 0.01.
    pub cp: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 30,
            min_samples_split: 20,
            min_samples_leaf: 7,
            cp: 0.01,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.cp) {
            return Err(ConfigError::OutOfRange {
                field: "tree.cp",
                range: "[0, 1)",
                value: self.cp,
            });
        }
        if self.max_depth == 0 {
            return Err(ConfigError::OutOfRange {
                field: "tree.max_depth",
                range: ">= 1",
                value: 0.0,
            });
        }
        Ok(())
    }
}

impl LearnerFn for TreeConfig {
    type Model = TreeModel;

    fn name(&self) -> &str {
        "tree"
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        _derived: &DerivedParams,
        seed: u64,
    ) -> Result<TreeModel, FitError> {
        let y = target.to_matrix();
        let n = y.nrows() as f64;

        // Total within-node sum of squares at the root, over all outputs.
        let root_sse: f64 = y
            .columns()
            .into_iter()
            .map(|col| {
                let mean = col.sum() / n;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            })
            .sum();

        let params = GrowerParams {
            gain: GainParams {
                reg_lambda: 0.0,
                min_gain: 0.5 * self.cp * root_sse,
                min_child_weight: 0.0,
                min_samples_leaf: self.min_samples_leaf.max(1),
            },
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            features_per_node: None,
        };

        let (grads, hess) = squared_loss_from_zero(&y);
        let rows: Vec<usize> = (0..y.nrows()).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let tree = TreeGrower::new(x.view(), grads.view(), hess.view(), &params).grow(&rows, &mut rng);
        Ok(TreeModel { tree })
    }
}

// =============================================================================
// TreeModel
// =============================================================================

#[derive(Debug, Clone)]
pub struct TreeModel {
    tree: Tree,
}

impl TreeModel {
    pub fn tree(&self) -> &Tree {
        &self.tree
    }
}

impl Scorer for TreeModel {
    fn n_outputs(&self) -> usize {
        self.tree.n_outputs()
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        self.tree.leaf_value(self.tree.traverse_to_leaf(row)).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::Prediction;
    use ndarray::{Array1, array};

    fn blobs(n_per_class: usize) -> (Array2<f64>, Vec<usize>) {
        let n = 2 * n_per_class;
        let mut x = Array2::zeros((n, 2));
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let class = i / n_per_class;
            x[[i, 0]] = class as f64 * 10.0 + (i % n_per_class) as f64 * 0.1;
            x[[i, 1]] = (i % 7) as f64;
            labels.push(class);
        }
        (x, labels)
    }

    #[test]
    fn classifies_separable_blobs() {
        let (x, labels) = blobs(15);
        let target = Target::Classes {
            labels: &labels,
            n_classes: 2,
        };
        let model = TreeConfig::default().fit(x.view(), &target, 0).unwrap();
        assert_eq!(model.inner().tree().used_features(), vec![0]);
        assert_eq!(model.predict_row(array![0.5, 3.0].view()), Prediction::Class(0));
        assert_eq!(model.predict_row(array![11.0, 3.0].view()), Prediction::Class(1));
    }

    #[test]
    fn small_training_set_is_a_single_leaf() {
        // Fewer rows than `min_samples_split`: predicts the mean.
        let x = array![[0.0], [1.0], [2.0]];
        let y: Array1<f64> = array![1.0, 2.0, 6.0];
        let model = TreeConfig::default()
            .fit(x.view(), &Target::Values(y.view()), 0)
            .unwrap();
        assert_eq!(model.inner().tree().n_nodes(), 1);
        assert_eq!(model.predict_row(array![5.0].view()), Prediction::Value(3.0));
    }

    #[test]
    fn high_cp_prevents_splits() {
        let (x, labels) = blobs(15);
        let y: Array1<f64> = labels.iter().map(|&l| l as f64).collect();
        let config = TreeConfig {
            cp: 0.99,
            ..Default::default()
        };
        let model = config.fit(x.view(), &Target::Values(y.view()), 0).unwrap();
        // A perfect split removes all error, which still beats cp = 0.99.
        assert_eq!(model.inner().tree().n_leaves(), 2);

        let noisy: Array1<f64> = (0..30).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let model = config.fit(x.view(), &Target::Values(noisy.view()), 0).unwrap();
        assert_eq!(model.inner().tree().n_leaves(), 1);
    }

    #[test]
    fn rejects_invalid_cp() {
        let config = TreeConfig {
            cp: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "tree.cp", .. })
        ));
    }
}
