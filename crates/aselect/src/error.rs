//! Error types.
//!
//! Each concern owns its error enum; [`Error`] is the run-level error returned
//! by the pipeline driver.

use crate::data::InstanceKey;

// =============================================================================
// InputError
// =============================================================================

/// Problems with the feature or performance tables.
///
/// All of these are fatal to a run: the pipeline never silently drops rows
/// or columns to make the inputs line up.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    /// The two tables do not cover the same instances.
    #[error(
        "instance mismatch: {} instance(s) only in feature table {:?}, {} only in performance table {:?}",
        .features_only.len(), .features_only, .performance_only.len(), .performance_only
    )]
    InstanceMismatch {
        features_only: Vec<InstanceKey>,
        performance_only: Vec<InstanceKey>,
    },

    /// An instance appears more than once in one table.
    #[error("duplicate instance {key} in {table} table")]
    DuplicateInstance { key: InstanceKey, table: &'static str },

    /// The designated baseline solver has no column.
    #[error("baseline solver '{0}' missing from performance table")]
    MissingBaseline(String),

    /// A configured solver has no column.
    #[error("solver '{0}' missing from performance table")]
    MissingSolver(String),

    /// A record lacks a value for a column every other record has.
    #[error("instance {key} has no value for feature '{feature}'")]
    MissingFeature { key: InstanceKey, feature: String },

    /// Feature values must be finite.
    #[error("instance {key} has non-finite value {value} for feature '{feature}'")]
    NonFiniteFeature {
        key: InstanceKey,
        feature: String,
        value: f64,
    },

    /// Runtimes must be non-negative (non-finite means "did not converge").
    #[error("instance {key} has negative runtime {value} for solver '{solver}'")]
    NegativeRuntime {
        key: InstanceKey,
        solver: String,
        value: f64,
    },

    /// No candidate solver reached the optimum on this instance.
    #[error("instance {0} has no finite runtime for any candidate solver")]
    NoFiniteRuntime(InstanceKey),

    /// The fastest candidate needed zero evaluations, so relERT has no
    /// finite scale.
    #[error("instance {0} has a zero runtime as its fastest candidate runtime")]
    ZeroRuntime(InstanceKey),

    /// Tables are empty after instance filtering.
    #[error("no instances left after filtering")]
    Empty,
}

// =============================================================================
// ConfigError
// =============================================================================

/// Invalid run configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptySet(&'static str),

    #[error("at least two candidate solvers are required, got {0}")]
    TooFewSolvers(usize),

    #[error("baseline solver '{0}' must not also be a candidate solver")]
    BaselineIsCandidate(String),

    #[error("PAR10 multiplier must be > 1, got {0}")]
    InvalidPar10Multiplier(f64),

    #[error("feature cost coefficient must be finite and >= 0, got {0}")]
    InvalidFeatureCost(f64),

    #[error("inner cross-validation needs at least 2 folds, got {0}")]
    InvalidInnerFolds(usize),

    #[error("{field} must be in {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },
}

// =============================================================================
// FitError / FoldError
// =============================================================================

/// A learner could not produce a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training set has no features")]
    NoFeatures,

    #[error("target length {targets} does not match {rows} training rows")]
    TargetLength { rows: usize, targets: usize },

    #[error("non-finite regression target at row {0}")]
    NonFiniteTarget(usize),

    #[error("class label {label} out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },

    /// A fitted model produced NaN or an infinite value.
    #[error("model output {output} is not finite")]
    NonFinitePrediction { output: usize },

    #[error("model has no outputs")]
    NoOutputs,

    /// The linear system of a kernel or spline fit is singular.
    #[error("singular system: pivot {pivot} at column {column} (matrix is not positive definite)")]
    Singular { column: usize, pivot: f64 },
}

/// A fit failure inside one LOOCV fold.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("fold holding out {held_out} failed ({model}): {source}")]
pub struct FoldError {
    /// Instance held out in the failed fold.
    pub held_out: InstanceKey,
    /// Which model of the fold failed (e.g. `solver A`, `pair A/B`, `classifier`).
    pub model: String,
    #[source]
    pub source: FitError,
}

// =============================================================================
// Error
// =============================================================================

/// Run-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
