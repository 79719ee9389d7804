//! Gain computation and regularization parameters.

// =============================================================================
// Gain Parameters
// =============================================================================

/// Parameters for split gain computation and leaf weight calculation.
///
/// These parameters are static for the lifetime of training and control
/// regularization and splitting constraints. Gradient and hessian sums are
/// per output; a multi-output split scores the sum over outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct GainParams {
    /// L2 regularization (lambda).
    pub reg_lambda: f64,
    /// Minimum split gain (gamma).
    pub min_gain: f64,
    /// Minimum sum of hessians per child.
    pub min_child_weight: f64,
    /// Minimum samples per child.
    pub min_samples_leaf: usize,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            reg_lambda: 1.0,
            min_gain: 0.0,
            min_child_weight: 1.0,
            min_samples_leaf: 1,
        }
    }
}

impl GainParams {
    /// Structure score of one node.
    ///
    /// ```text
    /// score = Σ_k G_k² / (H_k + λ)
    /// ```
    #[inline]
    pub fn score(&self, grad: &[f64], hess: &[f64]) -> f64 {
        grad.iter()
            .zip(hess)
            .map(|(&g, &h)| {
                let denom = h + self.reg_lambda;
                if denom > 0.0 { g * g / denom } else { 0.0 }
            })
            .sum()
    }

    /// Compute the split gain using XGBoost formula.
    ///
    /// ```text
    /// gain = 0.5 * [score(L) + score(R) - score(P)] - γ
    /// ```
    #[inline]
    pub fn compute_gain(&self, score_left: f64, score_right: f64, score_parent: f64) -> f64 {
        0.5 * (score_left + score_right - score_parent) - self.min_gain
    }

    /// Check if a split satisfies minimum constraints.
    ///
    /// The hessian constraint applies to the total over outputs.
    #[inline]
    pub fn is_valid_split(
        &self,
        hess_left: f64,
        hess_right: f64,
        count_left: usize,
        count_right: usize,
    ) -> bool {
        hess_left >= self.min_child_weight
            && hess_right >= self.min_child_weight
            && count_left >= self.min_samples_leaf
            && count_right >= self.min_samples_leaf
    }

    /// Leaf weight with L2 regularization: `-G / (H + λ)`.
    #[inline]
    pub fn compute_leaf_weight(&self, grad_sum: f64, hess_sum: f64) -> f64 {
        let denom = hess_sum + self.reg_lambda;
        if denom > 0.0 { -grad_sum / denom } else { 0.0 }
    }
}
