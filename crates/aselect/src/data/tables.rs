//! Input tables.
//!
//! [`FeatureTable`] and [`PerformanceTable`] are built from structured
//! records, validated once, and read-only afterwards. Both store one row per
//! instance, sorted by [`InstanceKey`], with a dense `[n_instances, n_columns]`
//! value matrix.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::InstanceKey;
use crate::error::InputError;

// =============================================================================
// Records
// =============================================================================

/// Landscape features of one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(flatten)]
    pub key: InstanceKey,
    /// Feature name to scaled value.
    pub features: BTreeMap<String, f64>,
}

/// Raw runtime estimates of every solver on one instance.
///
/// `None` (JSON `null`) marks a run that did not converge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    #[serde(flatten)]
    pub key: InstanceKey,
    /// Solver name to expected running time.
    pub ert: BTreeMap<String, Option<f64>>,
}

// =============================================================================
// FeatureTable
// =============================================================================

/// Scaled landscape features, one row per instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    names: Vec<String>,
    keys: Vec<InstanceKey>,
    values: Array2<f64>,
}

impl FeatureTable {
    /// Build from records.
    ///
    /// The column set is taken from the records; every record must carry every
    /// column with a finite value.
    ///
    /// # Errors
    ///
    /// [`InputError::DuplicateInstance`], [`InputError::MissingFeature`],
    /// [`InputError::NonFiniteFeature`] or [`InputError::Empty`].
    pub fn from_records(records: &[FeatureRecord]) -> Result<Self, InputError> {
        let mut by_key: BTreeMap<InstanceKey, &FeatureRecord> = BTreeMap::new();
        for record in records {
            if by_key.insert(record.key, record).is_some() {
                return Err(InputError::DuplicateInstance {
                    key: record.key,
                    table: "feature",
                });
            }
        }
        if by_key.is_empty() {
            return Err(InputError::Empty);
        }

        let names: Vec<String> = records
            .iter()
            .flat_map(|r| r.features.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect();

        let mut values = Array2::<f64>::zeros((by_key.len(), names.len()));
        for (row, (key, record)) in by_key.iter().enumerate() {
            for (col, name) in names.iter().enumerate() {
                let value = *record.features.get(name).ok_or_else(|| InputError::MissingFeature {
                    key: *key,
                    feature: name.clone(),
                })?;
                if !value.is_finite() {
                    return Err(InputError::NonFiniteFeature {
                        key: *key,
                        feature: name.clone(),
                        value,
                    });
                }
                values[[row, col]] = value;
            }
        }

        Ok(Self {
            names,
            keys: by_key.into_keys().collect(),
            values,
        })
    }

    /// Feature names, in column order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Instance keys, in row order.
    pub fn keys(&self) -> &[InstanceKey] {
        &self.keys
    }

    /// Feature matrix `[n_instances, n_features]`.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_instances(&self) -> usize {
        self.keys.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Feature row of an instance.
    pub fn row(&self, key: &InstanceKey) -> Option<ArrayView1<'_, f64>> {
        self.keys
            .binary_search(key)
            .ok()
            .map(|idx| self.values.row(idx))
    }

    /// Keep only instances accepted by `keep`.
    pub fn retain(&self, keep: impl Fn(&InstanceKey) -> bool) -> Self {
        let rows: Vec<usize> = (0..self.keys.len()).filter(|&i| keep(&self.keys[i])).collect();
        Self {
            names: self.names.clone(),
            keys: rows.iter().map(|&i| self.keys[i]).collect(),
            values: self.values.select(ndarray::Axis(0), &rows),
        }
    }
}

// =============================================================================
// PerformanceTable
// =============================================================================

/// Raw runtime estimates, one row per instance, one column per solver.
///
/// Non-converged runs are stored as `f64::INFINITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceTable {
    solvers: Vec<String>,
    keys: Vec<InstanceKey>,
    ert: Array2<f64>,
}

impl PerformanceTable {
    /// Build from records.
    ///
    /// # Errors
    ///
    /// [`InputError::DuplicateInstance`], [`InputError::MissingSolver`],
    /// [`InputError::NegativeRuntime`] or [`InputError::Empty`].
    pub fn from_records(records: &[PerformanceRecord]) -> Result<Self, InputError> {
        let mut by_key: BTreeMap<InstanceKey, &PerformanceRecord> = BTreeMap::new();
        for record in records {
            if by_key.insert(record.key, record).is_some() {
                return Err(InputError::DuplicateInstance {
                    key: record.key,
                    table: "performance",
                });
            }
        }
        if by_key.is_empty() {
            return Err(InputError::Empty);
        }

        let solvers: Vec<String> = records
            .iter()
            .flat_map(|r| r.ert.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect();

        let mut ert = Array2::<f64>::zeros((by_key.len(), solvers.len()));
        for (row, (key, record)) in by_key.iter().enumerate() {
            for (col, solver) in solvers.iter().enumerate() {
                let value = record
                    .ert
                    .get(solver)
                    .ok_or_else(|| InputError::MissingSolver(solver.clone()))?
                    .unwrap_or(f64::INFINITY);
                if value < 0.0 {
                    return Err(InputError::NegativeRuntime {
                        key: *key,
                        solver: solver.clone(),
                        value,
                    });
                }
                // NaN carries the same meaning as a missing runtime.
                ert[[row, col]] = if value.is_nan() { f64::INFINITY } else { value };
            }
        }

        Ok(Self {
            solvers,
            keys: by_key.into_keys().collect(),
            ert,
        })
    }

    /// Build directly from a matrix. Rows must be sorted by key.
    pub fn from_matrix(
        solvers: Vec<String>,
        keys: Vec<InstanceKey>,
        ert: Array2<f64>,
    ) -> Result<Self, InputError> {
        debug_assert_eq!(ert.dim(), (keys.len(), solvers.len()));
        if keys.is_empty() {
            return Err(InputError::Empty);
        }
        for pair in keys.windows(2) {
            if pair[0] >= pair[1] {
                return Err(InputError::DuplicateInstance {
                    key: pair[1],
                    table: "performance",
                });
            }
        }
        Ok(Self { solvers, keys, ert })
    }

    /// Solver names, in column order.
    pub fn solvers(&self) -> &[String] {
        &self.solvers
    }

    /// Instance keys, in row order.
    pub fn keys(&self) -> &[InstanceKey] {
        &self.keys
    }

    /// Runtime matrix `[n_instances, n_solvers]`.
    pub fn ert(&self) -> ArrayView2<'_, f64> {
        self.ert.view()
    }

    pub fn n_instances(&self) -> usize {
        self.keys.len()
    }

    /// Column index of a solver.
    pub fn solver_index(&self, name: &str) -> Option<usize> {
        self.solvers.iter().position(|s| s == name)
    }

    /// Keep only instances accepted by `keep`.
    pub fn retain(&self, keep: impl Fn(&InstanceKey) -> bool) -> Self {
        let rows: Vec<usize> = (0..self.keys.len()).filter(|&i| keep(&self.keys[i])).collect();
        Self {
            solvers: self.solvers.clone(),
            keys: rows.iter().map(|&i| self.keys[i]).collect(),
            ert: self.ert.select(ndarray::Axis(0), &rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_record(dim: u32, fid: u32, values: &[(&str, f64)]) -> FeatureRecord {
        FeatureRecord {
            key: InstanceKey::new(dim, fid),
            features: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn feature_table_sorts_rows_and_columns() {
        let records = vec![
            feature_record(3, 1, &[("b", 2.0), ("a", 1.0)]),
            feature_record(2, 5, &[("a", 3.0), ("b", 4.0)]),
        ];
        let table = FeatureTable::from_records(&records).unwrap();
        assert_eq!(table.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.keys()[0], InstanceKey::new(2, 5));
        assert_eq!(table.values()[[0, 1]], 4.0);
        assert_eq!(table.row(&InstanceKey::new(3, 1)).unwrap()[1], 2.0);
    }

    #[test]
    fn feature_table_rejects_missing_and_non_finite() {
        let records = vec![
            feature_record(2, 1, &[("a", 1.0), ("b", 2.0)]),
            feature_record(2, 2, &[("a", 1.0)]),
        ];
        assert!(matches!(
            FeatureTable::from_records(&records),
            Err(InputError::MissingFeature { .. })
        ));

        let records = vec![feature_record(2, 1, &[("a", f64::NAN)])];
        assert!(matches!(
            FeatureTable::from_records(&records),
            Err(InputError::NonFiniteFeature { .. })
        ));
    }

    #[test]
    fn feature_table_rejects_duplicates() {
        let records = vec![
            feature_record(2, 1, &[("a", 1.0)]),
            feature_record(2, 1, &[("a", 2.0)]),
        ];
        assert!(matches!(
            FeatureTable::from_records(&records),
            Err(InputError::DuplicateInstance { table: "feature", .. })
        ));
    }

    #[test]
    fn performance_table_maps_null_to_infinity() {
        let json = r#"[
            {"dimension": 2, "function_id": 1, "ert": {"X": 10.0, "Y": null}},
            {"dimension": 2, "function_id": 2, "ert": {"X": 3.5, "Y": 7.0}}
        ]"#;
        let records: Vec<PerformanceRecord> = serde_json::from_str(json).unwrap();
        let table = PerformanceTable::from_records(&records).unwrap();
        assert_eq!(table.solver_index("Y"), Some(1));
        assert!(table.ert()[[0, 1]].is_infinite());
        assert_eq!(table.ert()[[1, 0]], 3.5);
    }

    #[test]
    fn performance_table_rejects_negative_runtime() {
        let record = PerformanceRecord {
            key: InstanceKey::new(2, 1),
            ert: [("X".to_string(), Some(-1.0))].into_iter().collect(),
        };
        assert!(matches!(
            PerformanceTable::from_records(&[record]),
            Err(InputError::NegativeRuntime { .. })
        ));
    }

    #[test]
    fn retain_filters_rows() {
        let records = vec![
            feature_record(2, 1, &[("a", 1.0)]),
            feature_record(3, 1, &[("a", 2.0)]),
        ];
        let table = FeatureTable::from_records(&records).unwrap();
        let filtered = table.retain(|k| k.dimension == 3);
        assert_eq!(filtered.n_instances(), 1);
        assert_eq!(filtered.values()[[0, 0]], 2.0);
    }
}
