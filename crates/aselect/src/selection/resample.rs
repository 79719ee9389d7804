//! Cross-validated fitness of feature subsets.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use ndarray::Axis;
use rand::seq::SliceRandom;

use super::LabeledTable;
use crate::learners::{LearnerFn, Target};
use crate::utils::{derive_seed, seeded_rng};

/// Feature-inclusion bitmask over the columns of a [`LabeledTable`].
pub type Mask = Vec<bool>;

/// Scores feature subsets by k-fold misclassification rate.
///
/// The folds come from a seeded shuffle of the table rows and are fixed for
/// the lifetime of the evaluator, so every subset is judged on the same
/// splits. They are unrelated to any outer cross-validation.
///
/// The empty subset is scored by the majority-class predictor of each
/// training part. A fit failure scores the subset as `1.0`.
///
/// Results are memoized per mask; an evaluator lives inside one selection
/// run and is not shared across threads.
pub struct SubsetEvaluator<'a, 't, L> {
    learner: &'a L,
    table: &'a LabeledTable<'t>,
    /// Test rows of each fold.
    folds: Vec<Vec<usize>>,
    seed: u64,
    cache: RefCell<HashMap<Mask, f64>>,
    n_fits: Cell<usize>,
}

impl<'a, 't, L: LearnerFn> SubsetEvaluator<'a, 't, L> {
    pub fn new(learner: &'a L, table: &'a LabeledTable<'t>, n_folds: usize, seed: u64) -> Self {
        let n = table.labels.len();
        let k = n_folds.min(n).max(1);
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut seeded_rng(seed, &[0]));

        let mut folds = vec![Vec::new(); k];
        for (i, row) in order.into_iter().enumerate() {
            folds[i % k].push(row);
        }
        for fold in &mut folds {
            fold.sort_unstable();
        }

        Self {
            learner,
            table,
            folds,
            seed,
            cache: RefCell::new(HashMap::new()),
            n_fits: Cell::new(0),
        }
    }

    pub fn n_features(&self) -> usize {
        self.table.features.ncols()
    }

    /// Number of model fits performed so far.
    pub fn n_fits(&self) -> usize {
        self.n_fits.get()
    }

    /// Misclassification rate of `mask`, in `[0, 1]`.
    pub fn evaluate(&self, mask: &[bool]) -> f64 {
        if let Some(&score) = self.cache.borrow().get(mask) {
            return score;
        }
        let score = self.cross_validate(mask);
        self.cache.borrow_mut().insert(mask.to_vec(), score);
        score
    }

    fn cross_validate(&self, mask: &[bool]) -> f64 {
        let labels = self.table.labels;
        let n = labels.len();
        if n < 2 {
            return 0.0;
        }
        let columns: Vec<usize> = (0..mask.len()).filter(|&j| mask[j]).collect();

        let mut errors = 0usize;
        for (fold_idx, test) in self.folds.iter().enumerate() {
            let train: Vec<usize> = (0..n).filter(|r| test.binary_search(r).is_err()).collect();
            if train.is_empty() {
                continue;
            }
            let train_labels: Vec<usize> = train.iter().map(|&r| labels[r]).collect();

            if columns.is_empty() {
                let majority = majority_class(&train_labels, self.table.n_classes);
                errors += test.iter().filter(|&&r| labels[r] != majority).count();
                continue;
            }

            let x = self.table.features.select(Axis(0), &train).select(Axis(1), &columns);
            let target = Target::Classes {
                labels: &train_labels,
                n_classes: self.table.n_classes,
            };
            self.n_fits.set(self.n_fits.get() + 1);
            let seed = derive_seed(self.seed, &[1, fold_idx as u64]);
            match self.learner.fit(x.view(), &target, seed) {
                Ok(model) => {
                    for &r in test {
                        let row = self.table.features.row(r).select(Axis(0), &columns);
                        // A non-finite output counts as a miss.
                        let predicted = model.try_predict_row(row.view()).ok().and_then(|p| p.class());
                        if predicted != Some(labels[r]) {
                            errors += 1;
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(learner = self.learner.name(), %err, "subset fit failed");
                    return 1.0;
                }
            }
        }
        errors as f64 / n as f64
    }
}

/// Most frequent label; ties resolve to the lowest label.
pub fn majority_class(labels: &[usize], n_classes: usize) -> usize {
    let mut counts = vec![0usize; n_classes.max(1)];
    for &l in labels {
        if let Some(c) = counts.get_mut(l) {
            *c += 1;
        }
    }
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learners::TreeConfig;
    use ndarray::{Array2, array};

    fn stump() -> TreeConfig {
        TreeConfig {
            max_depth: 1,
            min_samples_split: 2,
            min_samples_leaf: 1,
            cp: 0.0,
        }
    }

    fn table_data() -> (Array2<f64>, Vec<usize>, Vec<String>) {
        // Feature 0 separates the classes; feature 1 is constant.
        let x = array![
            [0.0, 5.0],
            [0.1, 5.0],
            [0.2, 5.0],
            [0.3, 5.0],
            [1.0, 5.0],
            [1.1, 5.0],
            [1.2, 5.0],
            [1.3, 5.0],
        ];
        let labels = vec![0, 0, 0, 0, 1, 1, 1, 1];
        (x, labels, vec!["good".into(), "constant".into()])
    }

    #[test]
    fn majority_ties_take_lowest_label() {
        assert_eq!(majority_class(&[1, 0, 1, 0], 2), 0);
        assert_eq!(majority_class(&[2, 2, 1], 3), 2);
    }

    #[test]
    fn informative_subset_scores_better_than_empty() {
        let (x, labels, names) = table_data();
        let table = LabeledTable {
            features: x.view(),
            feature_names: &names,
            labels: &labels,
            n_classes: 2,
        };
        let learner = stump();
        let eval = SubsetEvaluator::new(&learner, &table, 4, 3);

        assert_eq!(eval.evaluate(&[true, false]), 0.0);
        assert!(eval.evaluate(&[false, false]) >= 0.5);
        assert!(eval.evaluate(&[false, true]) >= 0.5);
    }

    #[test]
    fn results_are_memoized() {
        let (x, labels, names) = table_data();
        let table = LabeledTable {
            features: x.view(),
            feature_names: &names,
            labels: &labels,
            n_classes: 2,
        };
        let learner = stump();
        let eval = SubsetEvaluator::new(&learner, &table, 4, 3);
        eval.evaluate(&[true, true]);
        let fits = eval.n_fits();
        assert_eq!(fits, 4);
        eval.evaluate(&[true, true]);
        assert_eq!(eval.n_fits(), fits);
    }

    #[test]
    fn folds_partition_rows() {
        let (x, labels, names) = table_data();
        let table = LabeledTable {
            features: x.view(),
            feature_names: &names,
            labels: &labels,
            n_classes: 2,
        };
        let learner = stump();
        let eval = SubsetEvaluator::new(&learner, &table, 3, 9);
        let mut all: Vec<usize> = eval.folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..8).collect::<Vec<_>>());
        assert_eq!(eval.folds.len(), 3);
    }
}
