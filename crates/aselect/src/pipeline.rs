//! Run driver.
//!
//! [`Pipeline::run`] takes the two input tables through the whole process:
//!
//! 1. restrict and join the tables, score runtimes ([`MetaDataset::assemble`])
//! 2. acquire the run's worker pool
//! 3. for every (learner, strategy) pair, run LOOCV for each family
//! 4. aggregate into a [`RunReport`]
//!
//! The pool is scoped to step 3 and released on every exit path.

use crate::aggregate::{ResultAggregator, RunReport};
use crate::config::RunConfig;
use crate::cv::CrossValidator;
use crate::data::{AssemblySpec, FeatureTable, MetaDataset, PerformanceTable};
use crate::error::{ConfigError, InputError, Result};
use crate::learners::Learner;
use crate::utils::{Parallelism, derive_seed, mean, run_with_threads};

/// State shared by every stage of one run.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub seed: u64,
    pub parallelism: Parallelism,
}

/// A validated run configuration, ready to execute.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: RunConfig,
}

impl Pipeline {
    /// # Errors
    ///
    /// [`ConfigError`] if `config` does not validate.
    pub fn new(config: RunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Restrict, join and score the input tables.
    pub fn assemble(
        &self,
        features: &FeatureTable,
        performance: &PerformanceTable,
    ) -> Result<MetaDataset, InputError> {
        let config = &self.config;
        let spec = AssemblySpec {
            solvers: &config.solvers,
            baseline: &config.baseline,
            dimensions: &config.dimensions,
            function_ids: &config.function_ids,
            scorer: config.scorer(),
            seed: config.seed,
        };
        MetaDataset::assemble(features, performance, &spec)
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// - [`Error::Input`](crate::Error::Input) if the tables are inconsistent
    /// - [`Error::ThreadPool`](crate::Error::ThreadPool) if the worker pool
    ///   cannot be built
    ///
    /// Failed combinations are not errors; they are listed in the report.
    #[tracing::instrument(skip_all, fields(seed = self.config.seed))]
    pub fn run(&self, features: &FeatureTable, performance: &PerformanceTable) -> Result<RunReport> {
        let data = self.assemble(features, performance)?;
        tracing::info!(
            instances = data.n_instances(),
            features = data.n_features(),
            solvers = data.n_solvers(),
            par10 = data.par10(),
            par10_fc = data.par10_fc(),
            "dataset assembled"
        );

        let report = run_with_threads(self.config.n_threads, |parallelism| {
            let ctx = RunContext {
                seed: self.config.seed,
                parallelism,
            };
            self.evaluate(&data, &ctx)
        })?;

        tracing::info!(
            succeeded = report.combinations.len(),
            failed = report.failures.len(),
            best = report.best.as_deref().unwrap_or("none"),
            "run finished"
        );
        Ok(report)
    }

    /// Evaluate every configured combination on an assembled dataset.
    ///
    /// Each (learner, strategy) pair gets its own seed derived from the run
    /// seed and the pair's position in the configuration.
    pub fn evaluate(&self, data: &MetaDataset, ctx: &RunContext) -> RunReport {
        let config = &self.config;
        let cv = CrossValidator::new(data, &config.selection, config.scope, ctx.parallelism);
        let mut aggregator = ResultAggregator::new(mean(&data.baseline().rel_ert));

        let total = config.learners.len() * config.strategies.len();
        let mut done = 0;
        for (l, &kind) in config.learners.iter().enumerate() {
            let learner = Learner::new(kind, &config.learner_params);
            for (s, &strategy) in config.strategies.iter().enumerate() {
                let pair_seed = derive_seed(ctx.seed, &[l as u64, s as u64]);
                let evaluation = cv.evaluate(&learner, strategy, &config.families, pair_seed);
                done += 1;
                tracing::info!(
                    learner = %kind,
                    %strategy,
                    done,
                    total,
                    "pair evaluated"
                );
                aggregator.add(evaluation);
            }
        }
        aggregator.finish(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::SelectorFamily;
    use crate::error::Error;
    use crate::learners::LearnerKind;
    use crate::selection::Strategy;
    use crate::testing::{SyntheticSpec, synthetic_tables};

    fn config(spec: &SyntheticSpec) -> RunConfig {
        RunConfig::builder()
            .solvers(spec.solvers.clone())
            .baseline(spec.baseline.clone())
            .dimensions(spec.dimensions.clone())
            .function_ids(spec.function_ids.clone())
            .learners(vec![LearnerKind::Tree])
            .strategies(vec![Strategy::All])
            .n_threads(1)
            .build()
            .unwrap()
    }

    #[test]
    fn runs_every_combination() {
        let spec = SyntheticSpec::default();
        let (features, performance) = synthetic_tables(&spec);
        let report = Pipeline::new(config(&spec))
            .unwrap()
            .run(&features, &performance)
            .unwrap();

        assert_eq!(report.n_instances, 12);
        assert_eq!(report.combinations.len() + report.failures.len(), 3);
        assert_eq!(report.virtual_best, 1.0);
        for family in SelectorFamily::ALL {
            let name = format!("{family}.tree.all");
            if let Some(result) = report.combination(&name) {
                assert_eq!(result.outcomes.len(), 12);
            }
        }
        assert_eq!(report.feature_subsets.len(), 1);
    }

    #[test]
    fn instance_filter_applies_to_both_tables() {
        let spec = SyntheticSpec::default();
        let (features, performance) = synthetic_tables(&spec);
        let mut cfg = config(&spec);
        cfg.dimensions = vec![3];
        let pipeline = Pipeline::new(cfg).unwrap();
        let data = pipeline.assemble(&features, &performance).unwrap();
        assert_eq!(data.n_instances(), 6);
        assert!(data.keys().iter().all(|k| k.dimension == 3));
    }

    #[test]
    fn mismatched_tables_are_fatal() {
        let spec = SyntheticSpec::default();
        let (features, performance) = synthetic_tables(&spec);
        let features = features.retain(|k| k.function_id != 4);
        let err = Pipeline::new(config(&spec))
            .unwrap()
            .run(&features, &performance)
            .unwrap_err();
        match err {
            Error::Input(InputError::InstanceMismatch {
                features_only,
                performance_only,
            }) => {
                assert!(features_only.is_empty());
                assert_eq!(performance_only.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_seed_same_report() {
        let spec = SyntheticSpec::default();
        let (features, performance) = synthetic_tables(&spec);
        let mut cfg = config(&spec);
        cfg.strategies = vec![Strategy::Sfbs];
        let pipeline = Pipeline::new(cfg).unwrap();
        let a = pipeline.run(&features, &performance).unwrap();
        let b = pipeline.run(&features, &performance).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
