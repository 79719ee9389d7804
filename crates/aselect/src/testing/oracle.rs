use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::cv::PairwiseMatrix;
use crate::data::MetaDataset;
use crate::error::FitError;
use crate::learners::{DerivedParams, LearnerFn, Scorer, Target};

/// True scores of every instance, looked up by exact feature row.
#[derive(Debug)]
struct Truth {
    features: Array2<f64>,
    rel_ert: Array2<f64>,
    best: Vec<usize>,
}

impl Truth {
    fn lookup(&self, row: ArrayView1<'_, f64>) -> Option<usize> {
        self.features.rows().into_iter().position(|r| r == row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Solver(usize),
    Difference(usize, usize),
    Best,
}

/// A learner that knows the answer.
///
/// At fit time it recognizes which quantity the targets are (a solver's
/// relERT, a pairwise difference, or the Best label) by matching them
/// against the truth of the training rows, and then predicts that quantity
/// exactly for any row of the dataset, held out or not. Rows are matched on
/// the full feature vector, so it must be used with every feature selected.
/// Unrecognized regression targets fall back to the first solver.
#[derive(Debug, Clone)]
pub struct OracleLearner {
    truth: Arc<Truth>,
}

impl OracleLearner {
    pub fn new(data: &MetaDataset) -> Self {
        Self {
            truth: Arc::new(Truth {
                features: data.features().to_owned(),
                rel_ert: data.rel_ert().to_owned(),
                best: data.best().to_vec(),
            }),
        }
    }

    fn value(&self, quantity: Quantity, row: usize) -> f64 {
        let rel = &self.truth.rel_ert;
        match quantity {
            Quantity::Solver(s) => rel[[row, s]],
            Quantity::Difference(a, b) => rel[[row, a]] - rel[[row, b]],
            Quantity::Best => self.truth.best[row] as f64,
        }
    }
}

/// Model produced by [`OracleLearner`].
#[derive(Debug, Clone)]
pub struct OracleModel {
    learner: OracleLearner,
    quantity: Quantity,
}

impl Scorer for OracleModel {
    fn n_outputs(&self) -> usize {
        match self.quantity {
            Quantity::Best => self.learner.truth.rel_ert.ncols(),
            _ => 1,
        }
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let Some(idx) = self.learner.truth.lookup(row) else {
            return vec![f64::NAN; self.n_outputs()];
        };
        match self.quantity {
            Quantity::Best => {
                let mut one_hot = vec![0.0; self.n_outputs()];
                one_hot[self.learner.truth.best[idx]] = 1.0;
                one_hot
            }
            q => vec![self.learner.value(q, idx)],
        }
    }
}

impl LearnerFn for OracleLearner {
    type Model = OracleModel;

    fn name(&self) -> &str {
        "oracle"
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        _derived: &DerivedParams,
        _seed: u64,
    ) -> Result<OracleModel, FitError> {
        let quantity = match target {
            Target::Classes { .. } => Quantity::Best,
            Target::Values(y) => {
                let rows: Vec<Option<usize>> =
                    x.rows().into_iter().map(|r| self.truth.lookup(r)).collect();
                let n_solvers = self.truth.rel_ert.ncols();
                let candidates = (0..n_solvers).map(Quantity::Solver).chain(
                    PairwiseMatrix::pairs(n_solvers).map(|(a, b)| Quantity::Difference(a, b)),
                );
                let mut found = Quantity::Solver(0);
                for q in candidates {
                    let matches = rows.iter().zip(y.iter()).all(|(row, &t)| {
                        row.is_some_and(|r| (self.value(q, r) - t).abs() <= 1e-9)
                    });
                    if matches {
                        found = q;
                        break;
                    }
                }
                found
            }
        };
        Ok(OracleModel {
            learner: self.clone(),
            quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SyntheticSpec, synthetic_dataset};
    use ndarray::Axis;

    #[test]
    fn predicts_held_out_relert_exactly() {
        let data = synthetic_dataset(&SyntheticSpec::default());
        let oracle = OracleLearner::new(&data);
        let train: Vec<usize> = (1..data.n_instances()).collect();
        let x = data.features().select(Axis(0), &train);
        let rel = data.rel_ert().select(Axis(0), &train);

        let model = oracle
            .fit(x.view(), &Target::Values(rel.column(1)), 0)
            .unwrap();
        assert_eq!(
            model.predict_row(data.features().row(0)).value(),
            Some(data.rel_ert()[[0, 1]])
        );

        let labels: Vec<usize> = train.iter().map(|&r| data.best()[r]).collect();
        let classes = Target::Classes {
            labels: &labels,
            n_classes: data.n_solvers(),
        };
        let model = oracle.fit(x.view(), &classes, 0).unwrap();
        assert_eq!(
            model.predict_row(data.features().row(0)).class(),
            Some(data.best()[0])
        );
    }
}
