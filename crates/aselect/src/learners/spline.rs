//! Additive hinge-function regression splines.
//!
//! A model is an intercept plus a sum of hinge functions
//! `max(0, x_j − t)` / `max(0, t − x_j)` on single features:
//!
//! 1. **Forward pass**: repeatedly add the mirrored hinge pair (feature,
//!    knot) that most reduces the residual sum of squares, until the term
//!    budget is used or the relative improvement drops below `threshold`.
//! 2. **Backward pass**: repeatedly drop the term whose removal hurts the
//!    fit least, and keep the subset with the lowest generalized
//!    cross-validation score
//!
//! ```text
//! GCV(M) = RSS / (n · (1 − C(M)/n)²),   C(M) = M + penalty · (M − 1) / 2
//! ```
//!
//! where `M` counts basis functions including the intercept.
//!
//! Multi-output targets (one-hot classes) share one basis and are fitted
//! jointly; RSS is summed over outputs.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{DerivedParams, LearnerFn, Scorer, Target};
use crate::error::{ConfigError, FitError};
use crate::linalg::solve_spd;
use crate::utils::quantile_sorted;

// =============================================================================
// Hinge
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// `max(0, x − t)`
    Above,
    /// `max(0, t − x)`
    Below,
}

/// One hinge basis function.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Hinge {
    feature: usize,
    knot: f64,
    side: Side,
}

impl Hinge {
    #[inline]
    fn eval(&self, row: ArrayView1<'_, f64>) -> f64 {
        let x = row[self.feature];
        match self.side {
            Side::Above => (x - self.knot).max(0.0),
            Side::Below => (self.knot - x).max(0.0),
        }
    }

    fn column(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.eval(row)).collect()
    }
}

// =============================================================================
// Least squares
// =============================================================================

/// Ridge-stabilized least squares on basis columns `[n, m]`.
///
/// Column 0 is the intercept and is not penalized; every other diagonal
/// entry of `BᵀB` is inflated by the relative factor `ridge`. Returns the
/// coefficients `[m, n_outputs]` and the residual sum of squares.
fn least_squares(
    basis: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    ridge: f64,
) -> Result<(Array2<f64>, f64), FitError> {
    let mut gram = basis.t().dot(&basis);
    for j in 1..gram.nrows() {
        gram[[j, j]] *= 1.0 + ridge;
    }
    let rhs = basis.t().dot(&y);
    let coef = solve_spd(gram.view(), rhs.view())?;
    let residual = &y - &basis.dot(&coef);
    let rss = residual.iter().map(|r| r * r).sum();
    Ok((coef, rss))
}

fn stack_columns(columns: &[Array1<f64>], n_rows: usize) -> Array2<f64> {
    let mut basis = Array2::zeros((n_rows, columns.len()));
    for (j, col) in columns.iter().enumerate() {
        basis.column_mut(j).assign(col);
    }
    basis
}

// =============================================================================
// SplineConfig
// =============================================================================

/// Additive hinge spline regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplineConfig {
    /// Maximum basis functions in the forward pass, intercept included.
    /// Default: 21.
    pub max_terms: usize,
    /// Candidate knots per feature (interior quantiles). Default: 20.
    pub max_knots: usize,
    /// Forward pass stops when the relative RSS improvement of the best
    /// pair falls below this. Default: 0.001.
    pub threshold: f64,
    /// GCV cost per knot. Default: 2.0.
    pub penalty: f64,
    /// Relative ridge on the normal equations. Default: 1e-6.
    pub ridge: f64,
}

impl Default for SplineConfig {
    fn default() -> Self {
        Self {
            max_terms: 21,
            max_knots: 20,
            threshold: 0.001,
            penalty: 2.0,
            ridge: 1e-6,
        }
    }
}

impl SplineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_terms < 3 {
            return Err(ConfigError::OutOfRange {
                field: "spline.max_terms",
                range: ">= 3",
                value: self.max_terms as f64,
            });
        }
        if self.max_knots == 0 {
            return Err(ConfigError::OutOfRange {
                field: "spline.max_knots",
                range: ">= 1",
                value: 0.0,
            });
        }
        for (field, value) in [
            ("spline.threshold", self.threshold),
            ("spline.penalty", self.penalty),
            ("spline.ridge", self.ridge),
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

    /// Interior quantile knots of one feature, excluding its min and max.
    fn candidate_knots(&self, column: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut sorted = column.to_vec();
        sorted.sort_by(f64::total_cmp);
        let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
            return Vec::new();
        };
        let mut knots: Vec<f64> = (1..=self.max_knots)
            .map(|j| quantile_sorted(&sorted, j as f64 / (self.max_knots + 1) as f64))
            .filter(|&t| t > lo && t < hi)
            .collect();
        knots.dedup();
        knots
    }

    fn gcv(&self, rss: f64, n_terms: usize, n_rows: usize) -> f64 {
        let n = n_rows as f64;
        let m = n_terms as f64;
        let cost = m + self.penalty * (m - 1.0) / 2.0;
        if cost >= n {
            return f64::INFINITY;
        }
        rss / (n * (1.0 - cost / n).powi(2))
    }

    fn forward_pass(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        tss: f64,
    ) -> (Vec<Hinge>, Vec<Array1<f64>>) {
        let n = x.nrows();
        let knots: Vec<Vec<f64>> = x
            .axis_iter(Axis(1))
            .map(|col| self.candidate_knots(col))
            .collect();

        let mut hinges = Vec::new();
        let mut columns = vec![Array1::ones(n)];
        let mut rss = tss;

        while columns.len() + 2 <= self.max_terms && rss > 0.0 {
            let mut best: Option<(f64, usize, f64)> = None;
            for (feature, feature_knots) in knots.iter().enumerate() {
                for &knot in feature_knots {
                    let pair = hinge_pair(feature, knot);
                    let mut trial = columns.clone();
                    trial.extend(pair.iter().map(|h| h.column(x)));
                    let basis = stack_columns(&trial, n);
                    let Ok((_, trial_rss)) = least_squares(basis.view(), y, self.ridge) else {
                        continue;
                    };
                    if best.is_none_or(|(b, _, _)| trial_rss < b) {
                        best = Some((trial_rss, feature, knot));
                    }
                }
            }

            let Some((best_rss, feature, knot)) = best else {
                break;
            };
            if (rss - best_rss) / tss < self.threshold {
                break;
            }
            for hinge in hinge_pair(feature, knot) {
                columns.push(hinge.column(x));
                hinges.push(hinge);
            }
            rss = best_rss;
            if rss / tss < self.threshold {
                break;
            }
        }
        (hinges, columns)
    }

    /// Returns the indices into `hinges` of the GCV-optimal subset.
    fn backward_pass(
        &self,
        columns: &[Array1<f64>],
        y: ArrayView2<'_, f64>,
        full_rss: f64,
    ) -> Vec<usize> {
        let n = y.nrows();
        // Positions into `columns`; 0 is the intercept and always kept.
        let mut active: Vec<usize> = (1..columns.len()).collect();
        let mut best_subset = active.clone();
        let mut best_gcv = self.gcv(full_rss, columns.len(), n);

        while !active.is_empty() {
            let mut drop: Option<(f64, usize)> = None;
            for pos in 0..active.len() {
                let mut kept: Vec<Array1<f64>> = vec![columns[0].clone()];
                kept.extend(
                    active
                        .iter()
                        .enumerate()
                        .filter(|&(p, _)| p != pos)
                        .map(|(_, &c)| columns[c].clone()),
                );
                let basis = stack_columns(&kept, n);
                let Ok((_, rss)) = least_squares(basis.view(), y, self.ridge) else {
                    continue;
                };
                if drop.is_none_or(|(b, _)| rss < b) {
                    drop = Some((rss, pos));
                }
            }
            let Some((rss, pos)) = drop else {
                break;
            };
            active.remove(pos);
            let gcv = self.gcv(rss, active.len() + 1, n);
            if gcv <= best_gcv {
                best_gcv = gcv;
                best_subset = active.clone();
            }
        }
        best_subset.into_iter().map(|c| c - 1).collect()
    }
}

fn hinge_pair(feature: usize, knot: f64) -> [Hinge; 2] {
    [
        Hinge {
            feature,
            knot,
            side: Side::Above,
        },
        Hinge {
            feature,
            knot,
            side: Side::Below,
        },
    ]
}

impl LearnerFn for SplineConfig {
    type Model = SplineModel;

    fn name(&self) -> &str {
        "spline"
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        _derived: &DerivedParams,
        _seed: u64,
    ) -> Result<SplineModel, FitError> {
        let y = target.to_matrix();
        let n = y.nrows();
        let tss: f64 = y
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.sum() / n as f64;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            })
            .sum();

        let (hinges, columns) = self.forward_pass(x, y.view(), tss);

        let kept: Vec<usize> = if hinges.is_empty() {
            Vec::new()
        } else {
            let basis = stack_columns(&columns, n);
            let (_, full_rss) = least_squares(basis.view(), y.view(), self.ridge)?;
            self.backward_pass(&columns, y.view(), full_rss)
        };

        let terms: Vec<Hinge> = kept.iter().map(|&i| hinges[i]).collect();
        let mut final_columns = vec![columns[0].clone()];
        final_columns.extend(kept.iter().map(|&i| columns[i + 1].clone()));
        let basis = stack_columns(&final_columns, n);
        let (coef, _) = least_squares(basis.view(), y.view(), self.ridge)?;

        Ok(SplineModel { terms, coef })
    }
}

// =============================================================================
// SplineModel
// =============================================================================

/// Fitted hinge spline.
#[derive(Debug, Clone)]
pub struct SplineModel {
    terms: Vec<Hinge>,
    /// `[1 + n_terms, n_outputs]`; row 0 is the intercept.
    coef: Array2<f64>,
}

impl SplineModel {
    /// Number of hinge terms, intercept excluded.
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// Features used by any term.
    pub fn used_features(&self) -> Vec<usize> {
        let mut used: Vec<usize> = self.terms.iter().map(|h| h.feature).collect();
        used.sort_unstable();
        used.dedup();
        used
    }
}

impl Scorer for SplineModel {
    fn n_outputs(&self) -> usize {
        self.coef.ncols()
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut out = self.coef.row(0).to_vec();
        for (j, hinge) in self.terms.iter().enumerate() {
            let h = hinge.eval(row);
            if h != 0.0 {
                for (o, &c) in out.iter_mut().zip(self.coef.row(j + 1)) {
                    *o += c * h;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::Prediction;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn knots_exclude_extremes() {
        let config = SplineConfig {
            max_knots: 3,
            ..Default::default()
        };
        let knots = config.candidate_knots(array![0.0, 1.0, 2.0, 3.0, 4.0].view());
        assert_eq!(knots, vec![1.0, 2.0, 3.0]);
        assert!(config.candidate_knots(array![1.0, 1.0].view()).is_empty());
    }

    #[test]
    fn gcv_penalizes_terms() {
        let config = SplineConfig::default();
        assert!(config.gcv(1.0, 3, 50) > config.gcv(1.0, 1, 50));
        assert_eq!(config.gcv(1.0, 30, 20), f64::INFINITY);
    }

    #[test]
    fn recovers_single_hinge() {
        // 43 rows put interior quantile knots on the even integers.
        let x: Array2<f64> =
            Array2::from_shape_fn((43, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 11) as f64 });
        let y: Array1<f64> = x.column(0).mapv(|v| 1.0 + 2.0 * (v - 10.0).max(0.0));
        let model = SplineConfig::default()
            .fit(x.view(), &Target::Values(y.view()), 0)
            .unwrap();
        assert_eq!(model.inner().used_features(), vec![0]);
        for v in [1.0, 8.0, 15.0, 30.0] {
            let pred = model.predict_row(array![v, 0.0].view()).value().unwrap();
            assert_abs_diff_eq!(pred, 1.0 + 2.0 * (v - 10.0f64).max(0.0), epsilon = 1e-3);
        }
    }

    #[test]
    fn constant_target_gives_intercept_only() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![2.0, 2.0, 2.0, 2.0];
        let model = SplineConfig::default()
            .fit(x.view(), &Target::Values(y.view()), 0)
            .unwrap();
        assert_eq!(model.inner().n_terms(), 0);
        assert_abs_diff_eq!(
            model.predict_row(array![10.0].view()).value().unwrap(),
            2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn classifies_with_joint_one_hot_fit() {
        let x: Array2<f64> = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let labels: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let target = Target::Classes {
            labels: &labels,
            n_classes: 2,
        };
        let model = SplineConfig::default().fit(x.view(), &target, 0).unwrap();
        assert_eq!(model.inner().n_outputs(), 2);
        assert_eq!(model.predict_row(array![2.0].view()), Prediction::Class(0));
        assert_eq!(model.predict_row(array![17.0].view()), Prediction::Class(1));
    }
}
