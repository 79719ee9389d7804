//! Exact greedy tree grower.
//!
//! Grows a depth-wise tree from per-row gradients and hessians. Every
//! learner family built on trees goes through here:
//!
//! - a single regression/classification tree fits squared loss from a zero
//!   prediction (`g = -y`, `h = 1`, `λ = 0`), so leaves are means and gain is
//!   half the SSE reduction (Gini reduction on one-hot targets)
//! - the forest grows the same trees on bootstrap rows with per-node
//!   feature subsampling
//! - boosting passes the loss gradients of the current ensemble
//!
//! Data sets in this domain have tens to a few hundred rows, so splits are
//! found by sorting each candidate feature per node rather than by
//! histograms.

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand_xoshiro::Xoshiro256PlusPlus;

use super::gain::GainParams;
use super::node::{NodeId, Tree};

/// Relative gain below which a split is considered noise.
const GAIN_EPS: f64 = 1e-12;

// =============================================================================
// GrowerParams
// =============================================================================

/// Structural limits for one tree.
#[derive(Clone, Debug, PartialEq)]
pub struct GrowerParams {
    pub gain: GainParams,
    /// Maximum depth; the root has depth 0.
    pub max_depth: usize,
    /// Nodes with fewer rows become leaves.
    pub min_samples_split: usize,
    /// Features drawn per node. `None` considers all.
    pub features_per_node: Option<usize>,
}

impl Default for GrowerParams {
    fn default() -> Self {
        Self {
            gain: GainParams::default(),
            max_depth: 6,
            min_samples_split: 2,
            features_per_node: None,
        }
    }
}

// =============================================================================
// TreeGrower
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
    /// Number of sorted rows that go left.
    n_left: usize,
}

/// Grows one [`Tree`].
pub struct TreeGrower<'f, 'a> {
    features: ArrayView2<'f, f64>,
    grads: ArrayView2<'a, f64>,
    hess: ArrayView2<'a, f64>,
    params: &'a GrowerParams,
}

impl<'f, 'a> TreeGrower<'f, 'a> {
    /// `features` is `[n_rows, n_features]`; `grads` and `hess` are
    /// `[n_rows, n_outputs]`.
    pub fn new(
        features: ArrayView2<'f, f64>,
        grads: ArrayView2<'a, f64>,
        hess: ArrayView2<'a, f64>,
        params: &'a GrowerParams,
    ) -> Self {
        debug_assert_eq!(features.nrows(), grads.nrows());
        debug_assert_eq!(grads.dim(), hess.dim());
        Self {
            features,
            grads,
            hess,
            params,
        }
    }

    /// Grow a tree over `rows`. Rows may repeat (bootstrap samples).
    ///
    /// `rng` is only consulted when `features_per_node` is set.
    pub fn grow(&self, rows: &[usize], rng: &mut Xoshiro256PlusPlus) -> Tree {
        let mut tree = Tree::with_outputs(self.grads.ncols());
        let root = tree.push_node();
        let mut stack: Vec<(NodeId, Vec<usize>, usize)> = vec![(root, rows.to_vec(), 0)];

        while let Some((node, node_rows, depth)) = stack.pop() {
            let (grad, hess) = self.sums(&node_rows);

            let split = if depth < self.params.max_depth
                && node_rows.len() >= self.params.min_samples_split.max(2)
            {
                self.find_split(&node_rows, &grad, &hess, rng)
            } else {
                None
            };

            match split {
                Some(split) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = node_rows
                        .iter()
                        .partition(|&&r| self.features[[r, split.feature]] < split.threshold);
                    debug_assert_eq!(left_rows.len(), split.n_left);
                    let left = tree.push_node();
                    let right = tree.push_node();
                    tree.set_split(node, split.feature, split.threshold, left, right);
                    stack.push((right, right_rows, depth + 1));
                    stack.push((left, left_rows, depth + 1));
                }
                None => {
                    let weights: Vec<f64> = grad
                        .iter()
                        .zip(&hess)
                        .map(|(&g, &h)| self.params.gain.compute_leaf_weight(g, h))
                        .collect();
                    tree.set_leaf(node, &weights);
                }
            }
        }
        tree
    }

    fn sums(&self, rows: &[usize]) -> (Vec<f64>, Vec<f64>) {
        let k = self.grads.ncols();
        let mut grad = vec![0.0; k];
        let mut hess = vec![0.0; k];
        for &r in rows {
            accumulate(&mut grad, self.grads.row(r));
            accumulate(&mut hess, self.hess.row(r));
        }
        (grad, hess)
    }

    fn candidate_features(&self, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let n_features = self.features.ncols();
        match self.params.features_per_node {
            Some(m) if m < n_features => {
                let mut picked = sample(rng, n_features, m.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn find_split(
        &self,
        rows: &[usize],
        grad: &[f64],
        hess: &[f64],
        rng: &mut Xoshiro256PlusPlus,
    ) -> Option<Split> {
        let gain_params = &self.params.gain;
        let parent_score = gain_params.score(grad, hess);
        let k = grad.len();
        let n = rows.len();

        let mut best: Option<Split> = None;
        let mut sorted = rows.to_vec();
        let mut grad_left = vec![0.0; k];
        let mut hess_left = vec![0.0; k];
        let mut grad_right = vec![0.0; k];
        let mut hess_right = vec![0.0; k];

        for feature in self.candidate_features(rng) {
            let column = self.features.column(feature);
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
            grad_left.iter_mut().for_each(|v| *v = 0.0);
            hess_left.iter_mut().for_each(|v| *v = 0.0);

            for i in 0..n - 1 {
                let r = sorted[i];
                accumulate(&mut grad_left, self.grads.row(r));
                accumulate(&mut hess_left, self.hess.row(r));

                let (lo, hi) = (column[r], column[sorted[i + 1]]);
                if lo == hi {
                    continue;
                }

                for j in 0..k {
                    grad_right[j] = grad[j] - grad_left[j];
                    hess_right[j] = hess[j] - hess_left[j];
                }
                let h_left: f64 = hess_left.iter().sum();
                let h_right: f64 = hess_right.iter().sum();
                if !gain_params.is_valid_split(h_left, h_right, i + 1, n - i - 1) {
                    continue;
                }

                let gain = gain_params.compute_gain(
                    gain_params.score(&grad_left, &hess_left),
                    gain_params.score(&grad_right, &hess_right),
                    parent_score,
                );
                if gain > GAIN_EPS * (1.0 + parent_score.abs())
                    && best.is_none_or(|b| gain > b.gain)
                {
                    best = Some(Split {
                        feature,
                        threshold: midpoint(lo, hi),
                        gain,
                        n_left: i + 1,
                    });
                }
            }
        }
        best
    }
}

#[inline]
fn accumulate(acc: &mut [f64], row: ArrayView1<'_, f64>) {
    for (a, &v) in acc.iter_mut().zip(row.iter()) {
        *a += v;
    }
}

/// Split threshold between two adjacent distinct values.
///
/// Falls back to `hi` when the midpoint rounds down to `lo`, so that
/// `lo < threshold <= hi` always holds.
#[inline]
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid > lo { mid } else { hi }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};
    use rand::SeedableRng;

    fn squared_loss_grads(targets: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        (targets.mapv(|y| -y), Array2::ones(targets.dim()))
    }

    fn unregularized() -> GrowerParams {
        GrowerParams {
            gain: GainParams {
                reg_lambda: 0.0,
                min_child_weight: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn separates_step_function() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![[1.0], [1.0], [5.0], [5.0]];
        let (g, h) = squared_loss_grads(&y);
        let params = unregularized();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = TreeGrower::new(x.view(), g.view(), h.view(), &params).grow(&[0, 1, 2, 3], &mut rng);

        assert_eq!(tree.n_leaves(), 2);
        for (row, expected) in [(0, 1.0), (1, 1.0), (2, 5.0), (3, 5.0)] {
            let leaf = tree.traverse_to_leaf(x.row(row));
            assert_eq!(tree.leaf_value(leaf)[0], expected);
        }
    }

    #[test]
    fn pure_node_stays_leaf() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![[3.0], [3.0], [3.0]];
        let (g, h) = squared_loss_grads(&y);
        let params = unregularized();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = TreeGrower::new(x.view(), g.view(), h.view(), &params).grow(&[0, 1, 2], &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.leaf_value(0), &[3.0]);
    }

    #[test]
    fn respects_max_depth() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![[0.0], [1.0], [2.0], [3.0]];
        let (g, h) = squared_loss_grads(&y);
        let params = GrowerParams {
            max_depth: 1,
            ..unregularized()
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = TreeGrower::new(x.view(), g.view(), h.view(), &params).grow(&[0, 1, 2, 3], &mut rng);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn one_hot_targets_give_class_frequencies() {
        let x = array![[0.0, 9.0], [0.1, 9.0], [5.0, 9.0], [5.1, 9.0]];
        let y = array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0]];
        let (g, h) = squared_loss_grads(&y);
        let params = unregularized();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let tree = TreeGrower::new(x.view(), g.view(), h.view(), &params).grow(&[0, 1, 2, 3], &mut rng);
        assert_eq!(tree.used_features(), vec![0]);
        let leaf = tree.traverse_to_leaf(x.row(3));
        assert_eq!(tree.leaf_value(leaf), &[0.0, 1.0]);
    }

    #[test]
    fn midpoint_stays_above_lower_value() {
        assert_eq!(midpoint(1.0, 2.0), 1.5);
        let lo = 1.0f64;
        let hi = f64::from_bits(lo.to_bits() + 1);
        assert_eq!(midpoint(lo, hi), hi);
    }
}
