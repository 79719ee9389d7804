//! Selector families: how model outputs become one chosen solver.

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::pairwise::PairwiseMatrix;
use crate::data::MetaDataset;
use crate::error::{FitError, FoldError};
use crate::learners::{LearnerFn, Model, Prediction, Scorer, Target};
use crate::utils::{argmin_first, derive_seed};

/// Decision policy of a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorFamily {
    /// One classifier from features to the Best solver.
    Classification,
    /// One regressor per solver; pick the smallest predicted relERT.
    Regression,
    /// One regressor per solver pair; pick the smallest row sum.
    Pairwise,
}

impl SelectorFamily {
    pub const ALL: [SelectorFamily; 3] = [
        SelectorFamily::Classification,
        SelectorFamily::Regression,
        SelectorFamily::Pairwise,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SelectorFamily::Classification => "classification",
            SelectorFamily::Regression => "regression",
            SelectorFamily::Pairwise => "pairwise",
        }
    }

    fn stream_id(self) -> u64 {
        match self {
            SelectorFamily::Classification => 0,
            SelectorFamily::Regression => 1,
            SelectorFamily::Pairwise => 2,
        }
    }

    /// Fit this family's models on the fold's training rows and choose a
    /// solver for the held-out row.
    pub(crate) fn choose<L: LearnerFn>(
        self,
        learner: &L,
        fold: &FoldData<'_>,
    ) -> Result<usize, FoldError> {
        let data = fold.data;
        let seed = |model: u64| derive_seed(fold.seed, &[self.stream_id(), model]);

        match self {
            SelectorFamily::Classification => {
                let labels: Vec<usize> = fold.train.iter().map(|&r| data.best()[r]).collect();
                let target = Target::Classes {
                    labels: &labels,
                    n_classes: data.n_solvers(),
                };
                let model = learner
                    .fit(fold.x_train.view(), &target, seed(0))
                    .map_err(|e| fold.error("classifier", e))?;
                match model.try_predict_row(fold.x_test.view()) {
                    Ok(Prediction::Class(c)) => Ok(c),
                    Ok(Prediction::Value(_)) => Err(fold.error("classifier", FitError::NoOutputs)),
                    Err(e) => Err(fold.error("classifier", e)),
                }
            }
            SelectorFamily::Regression => {
                let rel = data.rel_ert().select(Axis(0), fold.train);
                let mut predicted = Vec::with_capacity(data.n_solvers());
                for (s, solver) in data.solvers().iter().enumerate() {
                    let label = format!("solver {solver}");
                    let y = rel.column(s);
                    let model = learner
                        .fit(fold.x_train.view(), &Target::Values(y), seed(s as u64))
                        .map_err(|e| fold.error(&label, e))?;
                    predicted.push(predict_value(&model, fold).map_err(|e| fold.error(&label, e))?);
                }
                argmin_first(&predicted).ok_or_else(|| fold.error("regression", FitError::NoOutputs))
            }
            SelectorFamily::Pairwise => {
                let rel = data.rel_ert().select(Axis(0), fold.train);
                let solvers = data.solvers();
                let mut matrix = PairwiseMatrix::new(solvers.len());
                for (i, (a, b)) in PairwiseMatrix::pairs(solvers.len()).enumerate() {
                    let label = format!("pair {}/{}", solvers[a], solvers[b]);
                    let diff: Array1<f64> = &rel.column(a) - &rel.column(b);
                    let model = learner
                        .fit(fold.x_train.view(), &Target::Values(diff.view()), seed(i as u64))
                        .map_err(|e| fold.error(&label, e))?;
                    let pred = predict_value(&model, fold).map_err(|e| fold.error(&label, e))?;
                    matrix.set(a, b, pred);
                }
                matrix
                    .choose()
                    .ok_or_else(|| fold.error("pairwise", FitError::NoOutputs))
            }
        }
    }
}

/// Finite regression output of `model` for the held-out row.
fn predict_value<M: Scorer>(model: &Model<M>, fold: &FoldData<'_>) -> Result<f64, FitError> {
    match model.try_predict_row(fold.x_test.view())? {
        Prediction::Value(v) => Ok(v),
        Prediction::Class(_) => Err(FitError::NoOutputs),
    }
}

impl fmt::Display for SelectorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a family needs inside one fold.
pub(crate) struct FoldData<'d> {
    pub data: &'d MetaDataset,
    /// Training rows, excluding `held_out`.
    pub train: &'d [usize],
    pub held_out: usize,
    /// Selected features of the training rows.
    pub x_train: Array2<f64>,
    /// Selected features of the held-out row.
    pub x_test: Array1<f64>,
    pub seed: u64,
}

impl FoldData<'_> {
    fn error(&self, model: &str, source: FitError) -> FoldError {
        FoldError {
            held_out: self.data.keys()[self.held_out],
            model: model.to_string(),
            source,
        }
    }
}
