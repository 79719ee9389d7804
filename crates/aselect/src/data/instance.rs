//! Instance identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A problem instance: one benchmark function in one search-space dimension.
///
/// This is the join key across every table. Ordering is by dimension first,
/// then function id, which is also the row order of every assembled table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    /// Search-space dimension.
    pub dimension: u32,
    /// Benchmark function id.
    pub function_id: u32,
}

impl InstanceKey {
    pub const fn new(dimension: u32, function_id: u32) -> Self {
        Self {
            dimension,
            function_id,
        }
    }

    /// Stream ids for seed derivation.
    #[inline]
    pub(crate) fn seed_stream(&self) -> [u64; 2] {
        [self.dimension as u64, self.function_id as u64]
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(dim={}, fid={})", self.dimension, self.function_id)
    }
}
