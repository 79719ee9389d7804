//! Test and benchmark support.
//!
//! Seeded synthetic feature/performance tables and an oracle learner that
//! predicts the true scores of any instance it was built from.

mod oracle;

use std::collections::BTreeMap;

use rand::Rng;

pub use oracle::{OracleLearner, OracleModel};

use crate::data::{
    AssemblySpec, FeatureRecord, FeatureTable, InstanceKey, MetaDataset, PerformanceRecord,
    PerformanceTable,
};
use crate::scoring::PerformanceScorer;
use crate::utils::seeded_rng;

/// Shape of a synthetic benchmark.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub dimensions: Vec<u32>,
    pub function_ids: Vec<u32>,
    pub n_features: usize,
    /// Candidate solvers; the baseline column is added on top.
    pub solvers: Vec<String>,
    pub baseline: String,
    /// Probability that a non-winning candidate run does not converge.
    pub failure_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            dimensions: vec![2, 3],
            function_ids: (1..=6).collect(),
            n_features: 3,
            solvers: vec!["A".into(), "B".into(), "C".into()],
            baseline: "SBS".into(),
            failure_rate: 0.1,
            seed: 7,
        }
    }
}

/// Generate feature and performance records.
///
/// Features are uniform in `[-1, 1]`. Each solver's log-runtime is a random
/// linear function of the features plus the instance dimension, so the
/// winner depends on the features. The fastest candidate of every instance
/// always converges; the baseline never fails.
pub fn synthetic_records(spec: &SyntheticSpec) -> (Vec<FeatureRecord>, Vec<PerformanceRecord>) {
    let mut rng = seeded_rng(spec.seed, &[]);
    let n_solvers = spec.solvers.len() + 1;
    let weights: Vec<Vec<f64>> = (0..n_solvers)
        .map(|_| (0..spec.n_features).map(|_| rng.gen_range(-2.0..2.0)).collect())
        .collect();

    let mut features = Vec::new();
    let mut performance = Vec::new();
    for &dimension in &spec.dimensions {
        for &function_id in &spec.function_ids {
            let key = InstanceKey::new(dimension, function_id);
            let values: Vec<f64> = (0..spec.n_features)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect();

            let ert: Vec<f64> = weights
                .iter()
                .map(|w| {
                    let score: f64 = w.iter().zip(&values).map(|(a, b)| a * b).sum();
                    100.0 * f64::from(dimension) * (score + rng.gen_range(-0.1..0.1)).exp()
                })
                .collect();
            let candidates = &ert[..spec.solvers.len()];
            let fastest = candidates
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(i, _)| i);

            let mut runs = BTreeMap::new();
            for (s, solver) in spec.solvers.iter().enumerate() {
                let failed = s != fastest && rng.gen_bool(spec.failure_rate);
                runs.insert(solver.clone(), (!failed).then_some(ert[s]));
            }
            runs.insert(spec.baseline.clone(), Some(ert[spec.solvers.len()]));

            features.push(FeatureRecord {
                key,
                features: (0..spec.n_features)
                    .map(|j| (format!("f{j}"), values[j]))
                    .collect(),
            });
            performance.push(PerformanceRecord { key, ert: runs });
        }
    }
    (features, performance)
}

/// Synthetic records as validated tables.
pub fn synthetic_tables(spec: &SyntheticSpec) -> (FeatureTable, PerformanceTable) {
    let (features, performance) = synthetic_records(spec);
    (
        FeatureTable::from_records(&features).expect("synthetic features are valid"),
        PerformanceTable::from_records(&performance).expect("synthetic runtimes are valid"),
    )
}

/// Synthetic tables assembled with the default scorer.
pub fn synthetic_dataset(spec: &SyntheticSpec) -> MetaDataset {
    let (features, performance) = synthetic_tables(spec);
    let assembly = AssemblySpec {
        solvers: &spec.solvers,
        baseline: &spec.baseline,
        dimensions: &spec.dimensions,
        function_ids: &spec.function_ids,
        scorer: PerformanceScorer::default(),
        seed: spec.seed,
    };
    MetaDataset::assemble(&features, &performance, &assembly)
        .expect("synthetic tables always assemble")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_deterministic() {
        let spec = SyntheticSpec::default();
        assert_eq!(synthetic_records(&spec), synthetic_records(&spec));
    }

    #[test]
    fn dataset_has_every_instance() {
        let spec = SyntheticSpec::default();
        let data = synthetic_dataset(&spec);
        assert_eq!(data.n_instances(), 12);
        assert_eq!(data.n_features(), 3);
        assert_eq!(data.solvers(), spec.solvers.as_slice());
        assert!(data.virtual_best().iter().all(|&v| v == 1.0));
    }
}
