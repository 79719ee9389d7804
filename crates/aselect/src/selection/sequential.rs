//! Sequential floating search.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::resample::{Mask, SubsetEvaluator};
use crate::learners::LearnerFn;

/// Thresholds of the sequential searches.
///
/// Improvements are measured as `error(before) − error(after)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialParams {
    /// Minimum improvement to accept adding a feature. Default: 0.01.
    pub alpha: f64,
    /// Minimum improvement to accept removing a feature; negative values
    /// tolerate a slightly worse error for a smaller subset.
    /// Default: -0.001.
    pub beta: f64,
}

impl Default for SequentialParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: -0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Direction {
    Forward,
    Backward,
}

/// Search state: current subset, its error, and every subset already
/// occupied. Revisiting a subset is never accepted, which bounds the search.
struct Search<'e, 'a, 't, L> {
    eval: &'e SubsetEvaluator<'a, 't, L>,
    mask: Mask,
    error: f64,
    visited: HashSet<Mask>,
}

impl<L: LearnerFn> Search<'_, '_, '_, L> {
    /// Best single flip of a feature currently equal to `from`.
    fn best_flip(&self, from: bool) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for j in (0..self.mask.len()).filter(|&j| self.mask[j] == from) {
            let mut trial = self.mask.clone();
            trial[j] = !from;
            if self.visited.contains(&trial) {
                continue;
            }
            let err = self.eval.evaluate(&trial);
            if best.is_none_or(|(_, b)| err < b) {
                best = Some((j, err));
            }
        }
        best
    }

    /// Apply the best add (`from = false`) or remove (`from = true`) if its
    /// improvement reaches `min_improvement`.
    fn step(&mut self, from: bool, min_improvement: f64) -> bool {
        match self.best_flip(from) {
            Some((j, err)) if self.error - err >= min_improvement => {
                self.mask[j] = !from;
                self.error = err;
                self.visited.insert(self.mask.clone());
                true
            }
            _ => false,
        }
    }
}

/// Run a floating search.
///
/// Forward search starts empty and alternates one add with as many
/// removals as qualify; backward search starts full and alternates one
/// removal with as many additions as qualify. Both stop when the main step
/// no longer qualifies.
pub(super) fn floating_search<L: LearnerFn>(
    eval: &SubsetEvaluator<'_, '_, L>,
    params: &SequentialParams,
    direction: Direction,
) -> Mask {
    let n = eval.n_features();
    let start = vec![direction == Direction::Backward; n];
    let error = eval.evaluate(&start);
    let mut search = Search {
        eval,
        visited: HashSet::from([start.clone()]),
        mask: start,
        error,
    };

    let (main, main_threshold, float, float_threshold) = match direction {
        Direction::Forward => (false, params.alpha, true, params.beta),
        Direction::Backward => (true, params.beta, false, params.alpha),
    };

    while search.step(main, main_threshold) {
        tracing::trace!(
            error = search.error,
            size = search.mask.iter().filter(|&&b| b).count(),
            "sequential step"
        );
        while search.step(float, float_threshold) {}
    }
    search.mask
}
