//! Data handling.
//!
//! - [`InstanceKey`]: the (dimension, function id) join key
//! - [`FeatureTable`], [`PerformanceTable`]: validated, read-only inputs built
//!   from [`FeatureRecord`] / [`PerformanceRecord`]
//! - [`MetaDataset`]: the joined and scored table every stage reads

mod dataset;
mod instance;
mod tables;

pub use dataset::{AssemblySpec, BaselineScores, MetaDataset};
pub use instance::InstanceKey;
pub use tables::{FeatureRecord, FeatureTable, PerformanceRecord, PerformanceTable};
