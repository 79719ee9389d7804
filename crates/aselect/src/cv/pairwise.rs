//! Pairwise-regression vote matrix.

use ndarray::Array2;

use crate::utils::argmin_first;

/// Antisymmetric matrix of predicted pairwise relERT differences.
///
/// Entry `[a, b]` is the predicted `relERT(a) − relERT(b)`; the diagonal is
/// zero and `[b, a] = −[a, b]` always holds, because only the upper triangle
/// is ever written and the lower one mirrors it. The chosen solver has the
/// smallest row sum, i.e. it is predicted faster than the others by the
/// largest total margin.
///
/// The pairwise family fits one regression model per unordered pair, so a
/// fold costs `S(S−1)/2` fits for `S` solvers, against `S` for the
/// per-solver regression family and one for the classifier. In exchange
/// each model only has to learn a relative ordering, which is usually an
/// easier target than absolute relERT. With the handful of solvers of a
/// portfolio the quadratic factor stays small.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseMatrix {
    values: Array2<f64>,
}

impl PairwiseMatrix {
    pub fn new(n_solvers: usize) -> Self {
        Self {
            values: Array2::zeros((n_solvers, n_solvers)),
        }
    }

    pub fn n_solvers(&self) -> usize {
        self.values.nrows()
    }

    /// Unordered pairs `(a, b)` with `a < b`, in row-major order.
    pub fn pairs(n_solvers: usize) -> impl Iterator<Item = (usize, usize)> {
        (0..n_solvers).flat_map(move |a| ((a + 1)..n_solvers).map(move |b| (a, b)))
    }

    /// Record the predicted `relERT(a) − relERT(b)`.
    ///
    /// Pairs may be given in either order; `a == b` is ignored.
    pub fn set(&mut self, a: usize, b: usize, diff: f64) {
        if a == b {
            return;
        }
        self.values[[a, b]] = diff;
        self.values[[b, a]] = -diff;
    }

    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.values[[a, b]]
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.values.rows().into_iter().map(|r| r.sum()).collect()
    }

    /// Solver with the smallest row sum; ties go to the lowest index.
    pub fn choose(&self) -> Option<usize> {
        argmin_first(&self.row_sums())
    }
}
