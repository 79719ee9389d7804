//! Random forest.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::tree::{GainParams, GrowerParams, Tree, TreeGrower, squared_loss_from_zero};
use super::{DerivedParams, LearnerFn, Scorer, Target, TaskKind};
use crate::error::{ConfigError, FitError};
use crate::utils::seeded_rng;

/// Bagged, fully grown trees with per-node feature subsampling.
///
/// Each tree sees a bootstrap sample of the rows. At every node only
/// `mtry` randomly drawn features are split candidates. Predictions average
/// the trees; for classification that is the averaged class frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees. Default: 100.
    pub n_trees: usize,
    /// Features per node. `None`: `√p` for classification, `p/3` for
    /// regression.
    pub mtry: Option<usize>,
    /// Nodes with fewer rows are not split. `None`: 1 for classification,
    /// 5 for regression.
    pub node_size: Option<usize>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            mtry: None,
            node_size: None,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_trees == 0 {
            return Err(ConfigError::OutOfRange {
                field: "forest.n_trees",
                range: ">= 1",
                value: 0.0,
            });
        }
        if self.mtry == Some(0) {
            return Err(ConfigError::OutOfRange {
                field: "forest.mtry",
                range: ">= 1",
                value: 0.0,
            });
        }
        Ok(())
    }

    fn resolved_mtry(&self, task: TaskKind, n_features: usize) -> usize {
        let m = self.mtry.unwrap_or(match task {
            TaskKind::Classification { .. } => (n_features as f64).sqrt().floor() as usize,
            TaskKind::Regression => n_features / 3,
        });
        m.clamp(1, n_features)
    }

    fn resolved_node_size(&self, task: TaskKind) -> usize {
        self.node_size.unwrap_or(match task {
            TaskKind::Classification { .. } => 1,
            TaskKind::Regression => 5,
        })
    }
}

impl LearnerFn for ForestConfig {
    type Model = ForestModel;

    fn name(&self) -> &str {
        "forest"
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        _derived: &DerivedParams,
        seed: u64,
    ) -> Result<ForestModel, FitError> {
        let task = target.task();
        let y = target.to_matrix();
        let n = y.nrows();
        let (grads, hess) = squared_loss_from_zero(&y);

        let params = GrowerParams {
            gain: GainParams {
                reg_lambda: 0.0,
                min_gain: 0.0,
                min_child_weight: 0.0,
                min_samples_leaf: 1,
            },
            max_depth: usize::MAX,
            min_samples_split: self.resolved_node_size(task).max(2),
            features_per_node: Some(self.resolved_mtry(task, x.ncols())),
        };
        let grower = TreeGrower::new(x.view(), grads.view(), hess.view(), &params);

        let trees = (0..self.n_trees)
            .map(|t| {
                let mut rng = seeded_rng(seed, &[t as u64]);
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                grower.grow(&rows, &mut rng)
            })
            .collect();

        Ok(ForestModel {
            trees,
            n_outputs: y.ncols(),
        })
    }
}

/// Fitted forest.
#[derive(Debug, Clone)]
pub struct ForestModel {
    trees: Vec<Tree>,
    n_outputs: usize,
}

impl ForestModel {
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }
}

impl Scorer for ForestModel {
    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs];
        let scale = 1.0 / self.trees.len() as f64;
        for tree in &self.trees {
            tree.accumulate(row, scale, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::Prediction;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, array};

    #[test]
    fn default_mtry_and_node_size_follow_task() {
        let config = ForestConfig::default();
        let class = TaskKind::Classification { n_classes: 3 };
        assert_eq!(config.resolved_mtry(class, 10), 3);
        assert_eq!(config.resolved_mtry(TaskKind::Regression, 10), 3);
        assert_eq!(config.resolved_mtry(TaskKind::Regression, 2), 1);
        assert_eq!(config.resolved_node_size(class), 1);
        assert_eq!(config.resolved_node_size(TaskKind::Regression), 5);
    }

    #[test]
    fn fits_linear_trend_and_is_deterministic() {
        let n = 40;
        let x: Array2<f64> = Array2::from_shape_fn((n, 2), |(i, j)| (i * (j + 1)) as f64);
        let y: Array1<f64> = (0..n).map(|i| i as f64).collect();
        let config = ForestConfig {
            n_trees: 30,
            ..Default::default()
        };
        let a = config.fit(x.view(), &Target::Values(y.view()), 7).unwrap();
        let b = config.fit(x.view(), &Target::Values(y.view()), 7).unwrap();

        let row = array![30.0, 60.0];
        let pa = a.predict_row(row.view()).value().unwrap();
        let pb = b.predict_row(row.view()).value().unwrap();
        assert_eq!(pa, pb);
        assert_abs_diff_eq!(pa, 30.0, epsilon = 5.0);
        assert_eq!(a.inner().trees().len(), 30);
    }

    #[test]
    fn classifies_by_majority_frequency() {
        let x = array![[0.0], [0.2], [0.4], [5.0], [5.2], [5.4]];
        let labels = [0, 0, 0, 1, 1, 1];
        let target = Target::Classes {
            labels: &labels,
            n_classes: 2,
        };
        let model = ForestConfig::default().fit(x.view(), &target, 1).unwrap();
        assert_eq!(model.predict_row(array![0.1].view()), Prediction::Class(0));
        assert_eq!(model.predict_row(array![5.3].view()), Prediction::Class(1));
    }
}
