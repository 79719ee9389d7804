//! Evolutionary subset search.
//!
//! A (μ + λ) scheme over feature-inclusion bitmasks:
//!
//! - the initial population holds `μ` random masks (each bit set with
//!   probability 0.5)
//! - every generation breeds `λ` offspring from uniformly drawn parent
//!   pairs by uniform crossover and bit-flip mutation
//! - parents and offspring compete; the `μ` lowest-error masks survive
//!
//! The result is the best mask ever seen, preferring fewer features on
//! equal error.

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::resample::{Mask, SubsetEvaluator};
use crate::error::ConfigError;
use crate::learners::LearnerFn;

/// Settings of the genetic searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticParams {
    /// Generations. Default: 25.
    pub generations: usize,
    /// Population size μ of the small variant. Default: 10.
    pub mu: usize,
    /// Offspring per generation λ of the small variant. Default: 5.
    pub lambda: usize,
    /// Population multiplier of the large variant. Default: 10.
    pub large_factor: usize,
    /// Probability that a child is produced by crossover rather than
    /// copied from its first parent. Default: 0.5.
    pub crossover_rate: f64,
    /// Per-bit flip probability. Default: 0.05.
    pub mutation_rate: f64,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            generations: 25,
            mu: 10,
            lambda: 5,
            large_factor: 10,
            crossover_rate: 0.5,
            mutation_rate: 0.05,
        }
    }
}

impl GeneticParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("genetic.mu", self.mu),
            ("genetic.lambda", self.lambda),
            ("genetic.large_factor", self.large_factor),
        ] {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    range: ">= 1",
                    value: 0.0,
                });
            }
        }
        for (field, value) in [
            ("genetic.crossover_rate", self.crossover_rate),
            ("genetic.mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    range: "[0, 1]",
                    value,
                });
            }
        }
        Ok(())
    }

    /// `(μ, λ)` of the small or large variant.
    pub(super) fn population(&self, large: bool) -> (usize, usize) {
        let factor = if large { self.large_factor } else { 1 };
        (self.mu * factor, self.lambda * factor)
    }
}

/// Candidate with its error and size.
#[derive(Debug, Clone)]
struct Individual {
    mask: Mask,
    error: f64,
    size: usize,
}

impl Individual {
    fn new<L: LearnerFn>(mask: Mask, eval: &SubsetEvaluator<'_, '_, L>) -> Self {
        let error = eval.evaluate(&mask);
        let size = mask.iter().filter(|&&b| b).count();
        Self { mask, error, size }
    }

    /// Lower error first, then fewer features.
    fn better_than(&self, other: &Individual) -> bool {
        self.error < other.error || (self.error == other.error && self.size < other.size)
    }
}

pub(super) fn genetic_search<L: LearnerFn>(
    eval: &SubsetEvaluator<'_, '_, L>,
    params: &GeneticParams,
    large: bool,
    rng: &mut Xoshiro256PlusPlus,
) -> Mask {
    let n = eval.n_features();
    let (mu, lambda) = params.population(large);

    let mut population: Vec<Individual> = (0..mu)
        .map(|_| Individual::new((0..n).map(|_| rng.gen_bool(0.5)).collect(), eval))
        .collect();
    let mut best = fittest(&population).clone();

    for generation in 0..params.generations {
        let offspring: Vec<Individual> = (0..lambda)
            .map(|_| {
                let a = &population[rng.gen_range(0..population.len())].mask;
                let b = &population[rng.gen_range(0..population.len())].mask;
                let mut child = if rng.gen_bool(params.crossover_rate) {
                    a.iter()
                        .zip(b)
                        .map(|(&x, &y)| if rng.gen_bool(0.5) { x } else { y })
                        .collect()
                } else {
                    a.clone()
                };
                for bit in child.iter_mut() {
                    if rng.gen_bool(params.mutation_rate) {
                        *bit = !*bit;
                    }
                }
                Individual::new(child, eval)
            })
            .collect();

        population.extend(offspring);
        // Stable: on equal rank, earlier (older) individuals survive.
        population.sort_by(|x, y| {
            x.error
                .total_cmp(&y.error)
                .then_with(|| x.size.cmp(&y.size))
        });
        population.truncate(mu);

        if population[0].better_than(&best) {
            best = population[0].clone();
        }
        tracing::trace!(generation, error = best.error, size = best.size, "genetic generation");
    }
    best.mask
}

fn fittest(population: &[Individual]) -> &Individual {
    let mut best = &population[0];
    for ind in &population[1..] {
        if ind.better_than(best) {
            best = ind;
        }
    }
    best
}
