//! LOOCV integration tests.
//!
//! End-to-end behavior of the selector families on small hand-made and
//! synthetic benchmarks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use ndarray::{Array2, ArrayView1, ArrayView2};

use aselect::cv::{CrossValidator, SelectionScope, SelectorFamily};
use aselect::data::{
    AssemblySpec, FeatureRecord, FeatureTable, InstanceKey, MetaDataset, PerformanceRecord,
    PerformanceTable,
};
use aselect::learners::{DerivedParams, LearnerFn, LearnerKind, Scorer, Target};
use aselect::selection::{SelectionParams, Strategy};
use aselect::testing::{OracleLearner, SyntheticSpec, synthetic_dataset, synthetic_tables};
use aselect::{FailureReason, FitError, Parallelism, Pipeline, PerformanceScorer, RunConfig};

// =============================================================================
// Fixtures
// =============================================================================

const SOLVERS: [&str; 2] = ["X", "Y"];

/// Three instances, raw ERT `[(10, 20), (30, 15), (∞, 5)]`.
fn worked_example(feature: impl Fn(usize) -> f64) -> (FeatureTable, PerformanceTable) {
    let raw = [(Some(10.0), 20.0), (Some(30.0), 15.0), (None, 5.0)];
    let baseline = [20.0, 30.0, 10.0];

    let mut features = Vec::new();
    let mut performance = Vec::new();
    for (i, ((x, y), base)) in raw.iter().zip(baseline).enumerate() {
        let key = InstanceKey::new(2, i as u32 + 1);
        features.push(FeatureRecord {
            key,
            features: BTreeMap::from([("f".to_string(), feature(i))]),
        });
        performance.push(PerformanceRecord {
            key,
            ert: BTreeMap::from([
                ("X".to_string(), *x),
                ("Y".to_string(), Some(*y)),
                ("base".to_string(), Some(base)),
            ]),
        });
    }
    (
        FeatureTable::from_records(&features).unwrap(),
        PerformanceTable::from_records(&performance).unwrap(),
    )
}

fn assemble(features: &FeatureTable, performance: &PerformanceTable) -> MetaDataset {
    let solvers: Vec<String> = SOLVERS.iter().map(|s| s.to_string()).collect();
    let spec = AssemblySpec {
        solvers: &solvers,
        baseline: "base",
        dimensions: &[],
        function_ids: &[],
        scorer: PerformanceScorer::default(),
        seed: 0,
    };
    MetaDataset::assemble(features, performance, &spec).unwrap()
}

fn run_config(learner: LearnerKind, strategy: Strategy) -> RunConfig {
    RunConfig::builder()
        .solvers(SOLVERS.iter().map(|s| s.to_string()).collect())
        .baseline("base".into())
        .dimensions(vec![2])
        .function_ids(vec![1, 2, 3])
        .learners(vec![learner])
        .strategies(vec![strategy])
        .n_threads(1)
        .build()
        .unwrap()
}

/// Always fails with a singular system.
struct SingularLearner;

struct NeverFitted;

impl Scorer for NeverFitted {
    fn n_outputs(&self) -> usize {
        1
    }

    fn scores(&self, _row: ArrayView1<'_, f64>) -> Vec<f64> {
        vec![0.0]
    }
}

impl LearnerFn for SingularLearner {
    type Model = NeverFitted;

    fn name(&self) -> &str {
        "singular"
    }

    fn fit_with(
        &self,
        _x: ArrayView2<'_, f64>,
        _target: &Target<'_>,
        _derived: &DerivedParams,
        _seed: u64,
    ) -> Result<NeverFitted, FitError> {
        Err(FitError::Singular {
            column: 0,
            pivot: 0.0,
        })
    }
}

/// Fits fine but predicts NaN for every output.
struct NanLearner;

struct NanModel {
    n_outputs: usize,
}

impl Scorer for NanModel {
    fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    fn scores(&self, _row: ArrayView1<'_, f64>) -> Vec<f64> {
        vec![f64::NAN; self.n_outputs]
    }
}

impl LearnerFn for NanLearner {
    type Model = NanModel;

    fn name(&self) -> &str {
        "nan"
    }

    fn fit_with(
        &self,
        _x: ArrayView2<'_, f64>,
        target: &Target<'_>,
        _derived: &DerivedParams,
        _seed: u64,
    ) -> Result<NanModel, FitError> {
        let n_outputs = match target {
            Target::Values(_) => 1,
            Target::Classes { n_classes, .. } => *n_classes,
        };
        Ok(NanModel { n_outputs })
    }
}

/// Records, for every prediction, whether the predicted row was one of the
/// model's training rows.
#[derive(Default)]
struct ProbeLearner {
    leaks: Arc<Mutex<Vec<bool>>>,
}

struct ProbeModel {
    train: Array2<f64>,
    leaks: Arc<Mutex<Vec<bool>>>,
}

impl Scorer for ProbeModel {
    fn n_outputs(&self) -> usize {
        2
    }

    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let seen = self.train.rows().into_iter().any(|r| r == row);
        self.leaks.lock().unwrap().push(seen);
        vec![0.0, 0.0]
    }
}

impl LearnerFn for ProbeLearner {
    type Model = ProbeModel;

    fn name(&self) -> &str {
        "probe"
    }

    fn fit_with(
        &self,
        x: ArrayView2<'_, f64>,
        _target: &Target<'_>,
        _derived: &DerivedParams,
        _seed: u64,
    ) -> Result<ProbeModel, FitError> {
        Ok(ProbeModel {
            train: x.to_owned(),
            leaks: Arc::clone(&self.leaks),
        })
    }
}

// =============================================================================
// Worked example
// =============================================================================

#[test]
fn worked_example_scores() {
    let (features, performance) = worked_example(|i| i as f64);
    let data = assemble(&features, &performance);

    assert_eq!(data.par10(), 20.0);
    assert_eq!(
        data.rel_ert(),
        ndarray::array![[1.0, 2.0], [2.0, 1.0], [20.0, 1.0]]
    );
    assert_eq!(data.best(), &[0, 1, 1]);
}

#[rstest::rstest]
#[case(SelectorFamily::Classification)]
#[case(SelectorFamily::Regression)]
#[case(SelectorFamily::Pairwise)]
fn oracle_recovers_best_solver(#[case] family: SelectorFamily) {
    let (features, performance) = worked_example(|i| i as f64);
    let data = assemble(&features, &performance);
    let selection = SelectionParams::default();
    let cv = CrossValidator::new(&data, &selection, SelectionScope::PerFold, Parallelism::Sequential);

    let eval = cv.evaluate(&OracleLearner::new(&data), Strategy::All, &[family], 3);
    let outcomes = eval.families[0].result.as_ref().unwrap();

    let chosen: Vec<&str> = outcomes.iter().map(|o| o.solver.as_str()).collect();
    assert_eq!(chosen, ["X", "Y", "Y"]);
    let mean = outcomes.iter().map(|o| o.rel_ert).sum::<f64>() / outcomes.len() as f64;
    assert_relative_eq!(mean, 1.0);
}

#[test]
fn pipeline_reports_every_instance() {
    let (features, performance) = worked_example(|i| i as f64);
    let report = Pipeline::new(run_config(LearnerKind::Tree, Strategy::All))
        .unwrap()
        .run(&features, &performance)
        .unwrap();

    assert_eq!(report.n_instances, 3);
    assert_eq!(report.par10, 20.0);
    assert_eq!(report.virtual_best, 1.0);
    assert_relative_eq!(report.baseline.mean_rel_ert, 2.0);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.combinations.len(), 3);
    for result in &report.combinations {
        assert_eq!(result.outcomes.len(), 3);
        let keys: Vec<u32> = result.outcomes.iter().map(|o| o.key.function_id).collect();
        assert_eq!(keys, [1, 2, 3]);
    }
    assert_eq!(report.ranking.len(), 3);
    assert!(report.best.is_some());
}

// =============================================================================
// Failure semantics
// =============================================================================

#[test]
fn empty_subset_skips_all_families() {
    // A constant feature never beats the majority-class predictor.
    let (features, performance) = worked_example(|_| 1.0);
    let report = Pipeline::new(run_config(LearnerKind::Tree, Strategy::Sffs))
        .unwrap()
        .run(&features, &performance)
        .unwrap();

    assert!(report.combinations.is_empty());
    assert!(report.best.is_none());
    assert_eq!(report.failures.len(), 3);
    for failure in &report.failures {
        assert_eq!(failure.reason, FailureReason::EmptyFeatureSet);
    }
    assert!(report.feature_subsets[0].any_empty());
}

#[test]
fn fit_failure_aborts_combination_with_reason() {
    let data = synthetic_dataset(&SyntheticSpec::default());
    let selection = SelectionParams::default();
    let cv = CrossValidator::new(&data, &selection, SelectionScope::PerFold, Parallelism::Sequential);
    let eval = cv.evaluate(&SingularLearner, Strategy::All, &SelectorFamily::ALL, 0);

    for fam in &eval.families {
        match &fam.result {
            Err(FailureReason::Fold(err)) => {
                assert_eq!(err.held_out, data.keys()[0]);
                assert!(matches!(err.source, FitError::Singular { .. }));
            }
            other => panic!("{}: expected fold error, got {other:?}", fam.family),
        }
    }
    let models: Vec<&str> = eval
        .families
        .iter()
        .filter_map(|f| match &f.result {
            Err(FailureReason::Fold(err)) => Some(err.model.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(models, ["classifier", "solver A", "pair A/B"]);
}

#[test]
fn non_finite_prediction_aborts_combination() {
    let data = synthetic_dataset(&SyntheticSpec::default());
    let selection = SelectionParams::default();
    let cv = CrossValidator::new(&data, &selection, SelectionScope::PerFold, Parallelism::Sequential);
    let eval = cv.evaluate(&NanLearner, Strategy::All, &SelectorFamily::ALL, 0);

    assert_eq!(eval.families.len(), 3);
    for fam in &eval.families {
        match &fam.result {
            Err(FailureReason::Fold(err)) => {
                assert_eq!(err.held_out, data.keys()[0]);
                assert!(
                    matches!(err.source, FitError::NonFinitePrediction { .. }),
                    "{}: {:?}",
                    fam.family,
                    err.source
                );
            }
            other => panic!("{}: expected fold error, got {other:?}", fam.family),
        }
    }
}

// =============================================================================
// Isolation and agreement
// =============================================================================

#[rstest::rstest]
#[case(SelectionScope::PerFold)]
#[case(SelectionScope::Global)]
fn held_out_row_is_never_trained_on(#[case] scope: SelectionScope) {
    let data = synthetic_dataset(&SyntheticSpec::default());
    let selection = SelectionParams::default();
    let cv = CrossValidator::new(&data, &selection, scope, Parallelism::Sequential);
    let probe = ProbeLearner::default();
    let eval = cv.evaluate(&probe, Strategy::All, &SelectorFamily::ALL, 5);

    for fam in &eval.families {
        assert_eq!(fam.result.as_ref().unwrap().len(), data.n_instances());
    }
    let leaks = probe.leaks.lock().unwrap();
    let s = data.n_solvers();
    // One classifier, S regressors and S(S-1)/2 pairwise models per fold.
    assert_eq!(leaks.len(), data.n_instances() * (1 + s + s * (s - 1) / 2));
    assert!(leaks.iter().all(|&seen| !seen));
}

#[test]
fn oracle_families_agree() {
    let data = synthetic_dataset(&SyntheticSpec::default());
    let selection = SelectionParams::default();
    let cv = CrossValidator::new(&data, &selection, SelectionScope::PerFold, Parallelism::Sequential);
    let eval = cv.evaluate(&OracleLearner::new(&data), Strategy::All, &SelectorFamily::ALL, 8);

    let outcomes: Vec<_> = eval
        .families
        .iter()
        .map(|f| f.result.as_ref().unwrap())
        .collect();
    assert_eq!(outcomes[1], outcomes[2]);
    for family in &outcomes {
        assert_eq!(family.len(), data.n_instances());
        assert!(family.iter().all(|o| o.rel_ert == 1.0));
    }
}

#[test]
fn synthetic_pipeline_is_reproducible_across_thread_counts() {
    let spec = SyntheticSpec::default();
    let (features, performance) = synthetic_tables(&spec);
    let config = |threads| {
        RunConfig::builder()
            .solvers(spec.solvers.clone())
            .baseline(spec.baseline.clone())
            .dimensions(spec.dimensions.clone())
            .function_ids(spec.function_ids.clone())
            .learners(vec![LearnerKind::Tree, LearnerKind::Forest])
            .strategies(vec![Strategy::All, Strategy::Sfbs])
            .n_threads(threads)
            .build()
            .unwrap()
    };
    let sequential = Pipeline::new(config(1)).unwrap().run(&features, &performance).unwrap();
    let parallel = Pipeline::new(config(3)).unwrap().run(&features, &performance).unwrap();
    assert_eq!(
        serde_json::to_string(&sequential).unwrap(),
        serde_json::to_string(&parallel).unwrap()
    );
    assert_eq!(sequential.combinations.len() + sequential.failures.len(), 12);
}
