//! Common utilities used across the crate.
//!
//! Parallelism configuration, the scoped worker pool, seed derivation and a
//! few ordering helpers shared by the scorer and the selector families.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// This is a simple flag passed through the evaluation stages. When `true`,
/// stages may use `rayon` parallel iterators; when `false` they iterate
/// sequentially. The actual pool is set up once per run via
/// [`run_with_threads`]; stages never manage pools themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over `iter`, in parallel if allowed.
    ///
    /// Output order always matches input order, regardless of which worker
    /// finished first.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure inside a scoped worker pool.
///
/// Thread count semantics:
/// - `0` = auto (use all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// The pool lives for the duration of `f` only and is torn down when this
/// function returns, including when `f` returns an error.
///
/// # Errors
///
/// Returns the pool build error if the worker threads cannot be spawned.
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T, rayon::ThreadPoolBuildError> {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => Ok(f(Parallelism::Sequential)),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .thread_name(|i| format!("aselect-worker-{i}"))
                .build()?;
            Ok(pool.install(|| f(Parallelism::Parallel)))
        }
    }
}

// =============================================================================
// Seeding
// =============================================================================

/// Derive a seed for an independent random stream.
///
/// Mixes `base` with each stream id through a splitmix64 finalizer, so the
/// result depends only on the inputs and never on thread scheduling.
pub fn derive_seed(base: u64, stream: &[u64]) -> u64 {
    let mut state = splitmix64(base);
    for &id in stream {
        state = splitmix64(state ^ id.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    }
    state
}

/// Seeded generator for a derived stream.
pub fn seeded_rng(base: u64, stream: &[u64]) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(derive_seed(base, stream))
}

#[inline]
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// =============================================================================
// Ordering Helpers
// =============================================================================

/// Index of the first minimum of `values`.
///
/// Ties resolve to the lowest index. NaN never wins against a number.
/// Returns `None` for an empty slice.
pub fn argmin_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &v) in values.iter().enumerate() {
        match best {
            None => best = Some((idx, v)),
            Some((_, b)) if v < b || (b.is_nan() && !v.is_nan()) => best = Some((idx, v)),
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Index of the first maximum of `values`, same tie rules as [`argmin_first`].
pub fn argmax_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &v) in values.iter().enumerate() {
        match best {
            None => best = Some((idx, v)),
            Some((_, b)) if v > b || (b.is_nan() && !v.is_nan()) => best = Some((idx, v)),
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

/// Arithmetic mean; `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linear-interpolated quantile of already sorted values (R type 7).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}
