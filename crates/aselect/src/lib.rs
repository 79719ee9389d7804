//! aselect: per-instance algorithm selection for continuous black-box
//! optimization.
//!
//! Given landscape features of benchmark instances and the expected running
//! times of a portfolio of solvers, aselect evaluates meta-models that
//! predict the best solver per instance, under leave-one-instance-out
//! cross-validation and relERT scoring.
//!
//! # Key Types
//!
//! - [`FeatureTable`] / [`PerformanceTable`] - Validated inputs
//! - [`MetaDataset`] - Joined and scored table
//! - [`RunConfig`] - Configuration builder
//! - [`Pipeline`] - Runs all (learner × strategy × family) combinations
//! - [`RunReport`] - Aggregated results
//!
//! # Stages
//!
//! - [`scoring`]: relERT, PAR10 and the feature-cost surcharge
//! - [`learners`]: tree, kernel, forest, boosted and spline learners behind
//!   one [`LearnerFn`] trait
//! - [`selection`]: feature-subset search (`all`, `sffs`, `sfbs`, `ga`, `ga2`)
//! - [`cv`]: LOOCV and the classification / regression / pairwise selector
//!   families
//! - [`aggregate`]: means, ranking and the report
//!
//! # Running
//!
//! ```no_run
//! use aselect::testing::{SyntheticSpec, synthetic_tables};
//! use aselect::{Pipeline, RunConfig};
//!
//! let spec = SyntheticSpec::default();
//! let (features, performance) = synthetic_tables(&spec);
//! let config = RunConfig::builder()
//!     .solvers(spec.solvers.clone())
//!     .baseline(spec.baseline.clone())
//!     .dimensions(spec.dimensions.clone())
//!     .function_ids(spec.function_ids.clone())
//!     .build()?;
//! let report = Pipeline::new(config)?.run(&features, &performance)?;
//! println!("best: {:?}", report.best);
//! # Ok::<(), aselect::Error>(())
//! ```

pub mod aggregate;
pub mod config;
pub mod cv;
pub mod data;
pub mod error;
pub mod learners;
pub mod linalg;
pub mod pipeline;
pub mod scoring;
pub mod selection;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use aggregate::{CombinationFailure, CombinationResult, FailureReason, ResultAggregator, RunReport};
pub use config::RunConfig;
pub use cv::{CrossValidator, SelectionOutcome, SelectionScope, SelectorFamily};
pub use data::{FeatureTable, InstanceKey, MetaDataset, PerformanceTable};
pub use error::{ConfigError, Error, FitError, FoldError, InputError, Result};
pub use learners::{Learner, LearnerFn, LearnerKind, LearnerParams};
pub use pipeline::{Pipeline, RunContext};
pub use scoring::PerformanceScorer;
pub use selection::{FeatureSelector, FeatureSubset, Strategy};

// Shared utilities
pub use utils::{Parallelism, run_with_threads};
