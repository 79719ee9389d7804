//! RBF kernel machine.
//!
//! Kernel ridge regression with a Gaussian kernel on standardized features:
//!
//! ```text
//! k(x, x') = exp(-σ ‖x − x'‖²)
//! (K + λI) α = y − ȳ
//! f(x) = ȳ + Σ_i α_i k(x_i, x)
//! ```
//!
//! Classification fits one output per class on ±1 one-vs-rest targets.
//! The inverse width `σ` is derived from each training set by [`sigest`].

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{DerivedParams, LearnerFn, Scorer, Target};
use crate::error::{ConfigError, FitError};
use crate::linalg::solve_spd;
use crate::utils::quantile_sorted;

/// Fallback width when the training rows are all identical.
const DEFAULT_SIGMA: f64 = 1.0;

// =============================================================================
// Width estimation
// =============================================================================

/// Closed-form RBF width heuristic.
///
/// Takes the 0.1 and 0.9 quantiles `q10`, `q90` of the non-zero squared
/// pairwise distances between training rows and returns the midpoint of
/// `[1/q90, 1/q10]`. Uses every pair, so the estimate is deterministic.
/// Returns `None` when all rows coincide.
pub fn sigest(x: ArrayView2<'_, f64>) -> Option<f64> {
    let n = x.nrows();
    let mut dists = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_distance(x.row(i), x.row(j));
            if d > 0.0 {
                dists.push(d);
            }
        }
    }
    if dists.is_empty() {
        return None;
    }
    dists.sort_by(f64::total_cmp);
    let q10 = quantile_sorted(&dists, 0.1);
    let q90 = quantile_sorted(&dists, 0.9);
    Some(0.5 * (1.0 / q90 + 1.0 / q10))
}

#[inline]
fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum()
}

// =============================================================================
// Standardizer
// =============================================================================

/// Column centering and scaling learned on training rows.
#[derive(Debug, Clone)]
struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    fn fit(x: ArrayView2<'_, f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let scale = x.std_axis(Axis(0), 1.0).mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Self { mean, scale }
    }

    fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.mean) / &self.scale
    }

    fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        (&row - &self.mean) / &self.scale
    }
}

// =============================================================================
// KernelConfig
// =============================================================================

/// Gaussian-kernel ridge machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Ridge penalty `λ`. Default: 1.0.
    pub ridge: f64,
    /// Fixed inverse width. `None` estimates it per training set.
    pub sigma: Option<f64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            ridge: 1.0,
            sigma: None,
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ridge.is_nan() || self.ridge <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "kernel.ridge",
                range: "> 0",
                value: self.ridge,
            });
        }
        if let Some(sigma) = self.sigma {
            if sigma.is_nan() || sigma <= 0.0 {
                return Err(ConfigError::OutOfRange {
                    field: "kernel.sigma",
                    range: "> 0",
                    value: sigma,
                });
            }
        }
        Ok(())
    }
}

impl LearnerFn for KernelConfig {
    type Model = KernelModel;

    fn name(&self) -> &str {
        "kernel"
    }

    fn derive_params(&self, x: ArrayView2<'_, f64>) -> DerivedParams {
        let sigma = self.sigma.or_else(|| {
            let z = Standardizer::fit(x).transform(x);
            sigest(z.view())
        });
        DerivedParams {
            kernel_width: Some(sigma.unwrap_or(DEFAULT_SIGMA)),
        }
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        derived: &DerivedParams,
        _seed: u64,
    ) -> Result<KernelModel, FitError> {
        let sigma = derived.kernel_width.unwrap_or(DEFAULT_SIGMA);
        let standardizer = Standardizer::fit(x);
        let support = standardizer.transform(x);
        let n = support.nrows();

        let y = match target {
            Target::Values(_) => target.to_matrix(),
            Target::Classes { .. } => target.to_matrix().mapv(|v| 2.0 * v - 1.0),
        };
        let intercept = y.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(y.ncols()));
        let centered = &y - &intercept;

        let mut gram = Array2::zeros((n, n));
        for i in 0..n {
            gram[[i, i]] = 1.0 + self.ridge;
            for j in (i + 1)..n {
                let k = (-sigma * squared_distance(support.row(i), support.row(j))).exp();
                gram[[i, j]] = k;
                gram[[j, i]] = k;
            }
        }
        let alpha = solve_spd(gram.view(), centered.view())?;

        Ok(KernelModel {
            standardizer,
            support,
            alpha,
            intercept,
            sigma,
        })
    }
}

// =============================================================================
// KernelModel
// =============================================================================

/// Fitted kernel machine.
#[derive(Debug, Clone)]
pub struct KernelModel {
    standardizer: Standardizer,
    /// Standardized training rows `[n_support, n_features]`.
    support: Array2<f64>,
    /// Dual coefficients `[n_support, n_outputs]`.
    alpha: Array2<f64>,
    intercept: Array1<f64>,
    sigma: f64,
}

impl KernelModel {
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Scorer for KernelModel {
    fn n_outputs(&self) -> usize {
        self.alpha.ncols()
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let z = self.standardizer.transform_row(row);
        let k: Array1<f64> = self
            .support
            .outer_iter()
            .map(|s| (-self.sigma * squared_distance(s, z.view())).exp())
            .collect();
        (k.dot(&self.alpha) + &self.intercept).to_vec()
    }
}
