//! Run configuration with builder pattern.
//!
//! [`RunConfig`] collects everything a run needs: which instances and
//! solvers to use, which (learner, strategy, family) combinations to
//! evaluate, the scoring constants, and the search and learner
//! hyperparameters. It uses `bon` for builder generation with validation
//! and also deserializes from JSON, missing fields taking their defaults.
//!
//! # Example
//!
//! ```
//! use aselect::RunConfig;
//! use aselect::selection::Strategy;
//!
//! let config = RunConfig::builder()
//!     .solvers(vec!["BIPOP-CMA-ES".into(), "LSstep".into()])
//!     .baseline("HCMA".into())
//!     .strategies(vec![Strategy::All, Strategy::Sffs])
//!     .seed(7)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.par10_multiplier, 10.0);
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::cv::{SelectionScope, SelectorFamily};
use crate::error::ConfigError;
use crate::learners::{LearnerKind, LearnerParams};
use crate::scoring::{
    DEFAULT_FEATURE_COST_PER_DIMENSION, DEFAULT_PAR10_MULTIPLIER, PerformanceScorer,
};
use crate::selection::{SelectionParams, Strategy};

fn default_dimensions() -> Vec<u32> {
    vec![2, 3, 5, 10]
}

fn default_function_ids() -> Vec<u32> {
    (1..=24).collect()
}

fn default_strategies() -> Vec<Strategy> {
    Strategy::ALL.to_vec()
}

fn default_learners() -> Vec<LearnerKind> {
    LearnerKind::ALL.to_vec()
}

fn default_families() -> Vec<SelectorFamily> {
    SelectorFamily::ALL.to_vec()
}

fn default_feature_cost() -> f64 {
    DEFAULT_FEATURE_COST_PER_DIMENSION
}

fn default_par10() -> f64 {
    DEFAULT_PAR10_MULTIPLIER
}

fn default_seed() -> u64 {
    42
}

/// Configuration of one selection run.
///
/// # Structure
///
/// - **Instances**: `dimensions` × `function_ids` restrict both input tables
/// - **Solvers**: candidate `solvers` in tie-break order, plus the
///   `baseline` reference column
/// - **Combinations**: `learners` × `strategies` × `families`
/// - **Scoring**: `feature_cost`, `par10_multiplier`
/// - **Resources**: `seed`, `n_threads`
/// - **Nested groups**: `selection`, `learner_params`
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct RunConfig {
    // === Instances ===
    /// Dimensions to use. Default: `[2, 3, 5, 10]`.
    #[builder(default = default_dimensions())]
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<u32>,

    /// Function ids to use. Default: `1..=24`.
    #[builder(default = default_function_ids())]
    #[serde(default = "default_function_ids")]
    pub function_ids: Vec<u32>,

    // === Solvers ===
    /// Candidate solvers; their order breaks prediction ties.
    pub solvers: Vec<String>,

    /// Reference solver reported next to the selectors. Not a candidate.
    pub baseline: String,

    // === Combinations ===
    /// Default: all five.
    #[builder(default = default_strategies())]
    #[serde(default = "default_strategies")]
    pub strategies: Vec<Strategy>,

    /// Default: all five.
    #[builder(default = default_learners())]
    #[serde(default = "default_learners")]
    pub learners: Vec<LearnerKind>,

    /// Default: all three.
    #[builder(default = default_families())]
    #[serde(default = "default_families")]
    pub families: Vec<SelectorFamily>,

    // === Scoring ===
    /// Feature-computation surcharge per dimension. Default: 50.
    #[builder(default = DEFAULT_FEATURE_COST_PER_DIMENSION)]
    #[serde(default = "default_feature_cost")]
    pub feature_cost: f64,

    /// PAR10 penalty multiplier. Default: 10.
    #[builder(default = DEFAULT_PAR10_MULTIPLIER)]
    #[serde(default = "default_par10")]
    pub par10_multiplier: f64,

    // === Resources ===
    /// Random seed. Default: 42.
    #[builder(default = 42)]
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Worker threads: 0 = all cores, 1 = sequential. Default: 0.
    #[builder(default)]
    #[serde(default)]
    pub n_threads: usize,

    // === Nested parameter groups ===
    /// Where feature selection runs. Default: per fold.
    #[builder(default)]
    #[serde(default)]
    pub scope: SelectionScope,

    /// Feature-selection settings.
    #[builder(default)]
    #[serde(default)]
    pub selection: SelectionParams,

    /// Learner hyperparameters.
    #[builder(default)]
    #[serde(default)]
    pub learner_params: LearnerParams,
}

/// Custom finishing function that validates the config.
impl<S: run_config_builder::IsComplete> RunConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any invalid setting, see
    /// [`RunConfig::validate`].
    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl RunConfig {
    /// Check the configuration. Deserialized configs should call this
    /// before use.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::TooFewSolvers`] with fewer than two candidates
    /// - [`ConfigError::BaselineIsCandidate`] if the baseline is a candidate
    /// - [`ConfigError::EmptySet`] for an empty instance or combination set
    /// - [`ConfigError::InvalidPar10Multiplier`] unless the multiplier is > 1
    /// - [`ConfigError::InvalidFeatureCost`] for a negative or non-finite cost
    /// - nested selection or learner parameter errors
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solvers.len() < 2 {
            return Err(ConfigError::TooFewSolvers(self.solvers.len()));
        }
        if self.solvers.contains(&self.baseline) {
            return Err(ConfigError::BaselineIsCandidate(self.baseline.clone()));
        }
        for (name, empty) in [
            ("dimensions", self.dimensions.is_empty()),
            ("function_ids", self.function_ids.is_empty()),
            ("strategies", self.strategies.is_empty()),
            ("learners", self.learners.is_empty()),
            ("families", self.families.is_empty()),
        ] {
            if empty {
                return Err(ConfigError::EmptySet(name));
            }
        }
        let par10 = self.par10_multiplier;
        if par10.is_nan() || par10.is_infinite() || par10 <= 1.0 {
            return Err(ConfigError::InvalidPar10Multiplier(par10));
        }
        if !self.feature_cost.is_finite() || self.feature_cost < 0.0 {
            return Err(ConfigError::InvalidFeatureCost(self.feature_cost));
        }
        self.selection.validate()?;
        self.learner_params.validate()
    }

    pub fn scorer(&self) -> PerformanceScorer {
        PerformanceScorer::new(self.par10_multiplier, self.feature_cost)
    }

    /// Number of (learner, strategy, family) combinations.
    pub fn n_combinations(&self) -> usize {
        self.learners.len() * self.strategies.len() * self.families.len()
    }
}
