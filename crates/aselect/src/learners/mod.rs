//! Learner families.
//!
//! Every family implements [`LearnerFn`]: fit on a feature matrix and a
//! [`Target`], get back a [`Model`] that maps one feature row to a
//! [`Prediction`]. Underneath, each family fits a multi-output regressor;
//! classification targets are one-hot encoded (or one-vs-rest for the kernel
//! machine) and the predicted class is the arg-max output.
//!
//! - [`TreeConfig`]: a single CART tree with cost-complexity stopping
//! - [`ForestConfig`]: bagged trees with per-node feature subsampling
//! - [`BoostedConfig`]: gradient-boosted trees (squared loss / softmax)
//! - [`KernelConfig`]: RBF kernel ridge machine, width derived per fit
//! - [`SplineConfig`]: additive hinge-function regression with GCV pruning
//!
//! [`Learner`] is the tagged union the pipeline dispatches on.

mod boosted;
mod forest;
mod kernel;
mod spline;
pub mod tree;

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

pub use boosted::{BoostedConfig, BoostedModel};
pub use forest::{ForestConfig, ForestModel};
pub use kernel::{KernelConfig, KernelModel, sigest};
pub use spline::{SplineConfig, SplineModel};
pub use tree::{TreeConfig, TreeModel};

use crate::error::{ConfigError, FitError};
use crate::utils::argmax_first;

// =============================================================================
// Target / Prediction
// =============================================================================

/// What a model is asked to predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Regression,
    Classification { n_classes: usize },
}

/// Training target, aligned with the rows of the feature matrix.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Real-valued response.
    Values(ArrayView1<'a, f64>),
    /// Class labels in `0..n_classes`.
    Classes { labels: &'a [usize], n_classes: usize },
}

impl Target<'_> {
    pub fn len(&self) -> usize {
        match self {
            Target::Values(v) => v.len(),
            Target::Classes { labels, .. } => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task(&self) -> TaskKind {
        match *self {
            Target::Values(_) => TaskKind::Regression,
            Target::Classes { n_classes, .. } => TaskKind::Classification { n_classes },
        }
    }

    /// Check the target against a training matrix.
    pub fn validate(&self, x: ArrayView2<'_, f64>) -> Result<(), FitError> {
        if x.nrows() == 0 {
            return Err(FitError::EmptyTrainingSet);
        }
        if x.ncols() == 0 {
            return Err(FitError::NoFeatures);
        }
        if self.len() != x.nrows() {
            return Err(FitError::TargetLength {
                rows: x.nrows(),
                targets: self.len(),
            });
        }
        match *self {
            Target::Values(values) => {
                if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                    return Err(FitError::NonFiniteTarget(row));
                }
            }
            Target::Classes { labels, n_classes } => {
                if let Some(&label) = labels.iter().find(|&&l| l >= n_classes) {
                    return Err(FitError::LabelOutOfRange { label, n_classes });
                }
            }
        }
        Ok(())
    }

    /// Target as a `[n_rows, n_outputs]` matrix.
    ///
    /// Regression gives one column; classification gives one-hot columns.
    pub fn to_matrix(&self) -> Array2<f64> {
        match *self {
            Target::Values(values) => values.to_owned().insert_axis(ndarray::Axis(1)),
            Target::Classes { labels, n_classes } => {
                let mut m = Array2::zeros((labels.len(), n_classes));
                for (i, &l) in labels.iter().enumerate() {
                    m[[i, l]] = 1.0;
                }
                m
            }
        }
    }
}

/// Output of a model for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    Value(f64),
    Class(usize),
}

impl Prediction {
    pub fn value(self) -> Option<f64> {
        match self {
            Prediction::Value(v) => Some(v),
            Prediction::Class(_) => None,
        }
    }

    pub fn class(self) -> Option<usize> {
        match self {
            Prediction::Class(c) => Some(c),
            Prediction::Value(_) => None,
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Hyperparameters derived from the training data before fitting.
///
/// Produced by [`LearnerFn::derive_params`] on each training set, so a fold
/// never sees values derived from its held-out instance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedParams {
    /// RBF inverse width `σ` in `exp(-σ ‖x − x'‖²)`.
    pub kernel_width: Option<f64>,
}

/// A fitted multi-output regressor.
pub trait Scorer: Send + Sync {
    fn n_outputs(&self) -> usize;

    /// Raw outputs for one feature row.
    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64>;
}

/// A learner: fixed hyperparameters plus a fitting procedure.
pub trait LearnerFn: Send + Sync {
    type Model: Scorer;

    /// Short name used in combination names and logs.
    fn name(&self) -> &str;

    /// Pre-fit hook. Families with data-dependent hyperparameters override
    /// this; the default derives nothing.
    fn derive_params(&self, _x: ArrayView2<'_, f64>) -> DerivedParams {
        DerivedParams::default()
    }

    /// Fit on validated inputs.
    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        derived: &DerivedParams,
        seed: u64,
    ) -> Result<Self::Model, FitError>;

    /// Validate, derive, fit.
    fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        seed: u64,
    ) -> Result<Model<Self::Model>, FitError> {
        target.validate(x)?;
        let derived = self.derive_params(x);
        let inner = self.fit_with(x, target, &derived, seed)?;
        Ok(Model {
            task: target.task(),
            inner,
        })
    }
}

/// A fitted model together with the task it was fitted for.
#[derive(Debug, Clone)]
pub struct Model<M> {
    task: TaskKind,
    inner: M,
}

impl<M: Scorer> Model<M> {
    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Predict one row: the first output for regression, the arg-max output
    /// for classification.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Prediction {
        let scores = self.inner.scores(row);
        match self.task {
            TaskKind::Regression => Prediction::Value(scores.first().copied().unwrap_or(f64::NAN)),
            TaskKind::Classification { .. } => {
                Prediction::Class(argmax_first(&scores).unwrap_or(0))
            }
        }
    }

    /// Like [`predict_row`](Self::predict_row), but fails when any output is
    /// not finite or the model has no outputs.
    pub fn try_predict_row(&self, row: ArrayView1<'_, f64>) -> Result<Prediction, FitError> {
        let scores = self.inner.scores(row);
        if let Some(output) = scores.iter().position(|v| !v.is_finite()) {
            return Err(FitError::NonFinitePrediction { output });
        }
        match self.task {
            TaskKind::Regression => scores
                .first()
                .map(|&v| Prediction::Value(v))
                .ok_or(FitError::NoOutputs),
            TaskKind::Classification { .. } => argmax_first(&scores)
                .map(Prediction::Class)
                .ok_or(FitError::NoOutputs),
        }
    }
}

// =============================================================================
// Learner (tagged union)
// =============================================================================

/// Learner family identifier, as used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    Tree,
    Kernel,
    Forest,
    Boosted,
    Spline,
}

impl LearnerKind {
    pub const ALL: [LearnerKind; 5] = [
        LearnerKind::Tree,
        LearnerKind::Kernel,
        LearnerKind::Forest,
        LearnerKind::Boosted,
        LearnerKind::Spline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LearnerKind::Tree => "tree",
            LearnerKind::Kernel => "kernel",
            LearnerKind::Forest => "forest",
            LearnerKind::Boosted => "boosted",
            LearnerKind::Spline => "spline",
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyperparameters of every family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerParams {
    pub tree: TreeConfig,
    pub kernel: KernelConfig,
    pub forest: ForestConfig,
    pub boosted: BoostedConfig,
    pub spline: SplineConfig,
}

impl LearnerParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tree.validate()?;
        self.kernel.validate()?;
        self.forest.validate()?;
        self.boosted.validate()?;
        self.spline.validate()
    }
}

/// One learner of any family.
#[derive(Debug, Clone, PartialEq)]
pub enum Learner {
    Tree(TreeConfig),
    Kernel(KernelConfig),
    Forest(ForestConfig),
    Boosted(BoostedConfig),
    Spline(SplineConfig),
}

impl Learner {
    pub fn new(kind: LearnerKind, params: &LearnerParams) -> Self {
        match kind {
            LearnerKind::Tree => Learner::Tree(params.tree.clone()),
            LearnerKind::Kernel => Learner::Kernel(params.kernel.clone()),
            LearnerKind::Forest => Learner::Forest(params.forest.clone()),
            LearnerKind::Boosted => Learner::Boosted(params.boosted.clone()),
            LearnerKind::Spline => Learner::Spline(params.spline.clone()),
        }
    }

    pub fn kind(&self) -> LearnerKind {
        match self {
            Learner::Tree(_) => LearnerKind::Tree,
            Learner::Kernel(_) => LearnerKind::Kernel,
            Learner::Forest(_) => LearnerKind::Forest,
            Learner::Boosted(_) => LearnerKind::Boosted,
            Learner::Spline(_) => LearnerKind::Spline,
        }
    }
}

/// A model fitted by a [`Learner`].
#[derive(Debug, Clone)]
pub enum FittedModel {
    Tree(TreeModel),
    Kernel(KernelModel),
    Forest(ForestModel),
    Boosted(BoostedModel),
    Spline(SplineModel),
}

impl Scorer for FittedModel {
    fn n_outputs(&self) -> usize {
        match self {
            FittedModel::Tree(m) => m.n_outputs(),
            FittedModel::Kernel(m) => m.n_outputs(),
            FittedModel::Forest(m) => m.n_outputs(),
            FittedModel::Boosted(m) => m.n_outputs(),
            FittedModel::Spline(m) => m.n_outputs(),
        }
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        match self {
            FittedModel::Tree(m) => m.scores(row),
            FittedModel::Kernel(m) => m.scores(row),
            FittedModel::Forest(m) => m.scores(row),
            FittedModel::Boosted(m) => m.scores(row),
            FittedModel::Spline(m) => m.scores(row),
        }
    }
}

impl LearnerFn for Learner {
    type Model = FittedModel;

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn derive_params(&self, x: ArrayView2<'_, f64>) -> DerivedParams {
        match self {
            Learner::Kernel(c) => c.derive_params(x),
            _ => DerivedParams::default(),
        }
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        derived: &DerivedParams,
        seed: u64,
    ) -> Result<FittedModel, FitError> {
        Ok(match self {
            Learner::Tree(c) => FittedModel::Tree(c.fit_with(x, target, derived, seed)?),
            Learner::Kernel(c) => FittedModel::Kernel(c.fit_with(x, target, derived, seed)?),
            Learner::Forest(c) => FittedModel::Forest(c.fit_with(x, target, derived, seed)?),
            Learner::Boosted(c) => FittedModel::Boosted(c.fit_with(x, target, derived, seed)?),
            Learner::Spline(c) => FittedModel::Spline(c.fit_with(x, target, derived, seed)?),
        })
    }
}
