//! Dense symmetric positive-definite solves.
//!
//! The kernel machine and the spline regression both reduce to
//! `A x = B` with symmetric `A`. A failed factorization is reported as
//! [`FitError::Singular`] instead of producing a degenerate model.

use ndarray::{Array2, ArrayView2};

use crate::error::FitError;

/// Pivots below this are treated as zero.
const PIVOT_EPS: f64 = 1e-12;

/// Lower-triangular Cholesky factor `L` with `A = L Lᵀ`.
pub fn cholesky(a: ArrayView2<'_, f64>) -> Result<Array2<f64>, FitError> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let mut l = Array2::<f64>::zeros((n, n));

    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !diag.is_finite() || diag <= PIVOT_EPS * a[[j, j]].abs().max(1.0) {
            return Err(FitError::Singular {
                column: j,
                pivot: diag,
            });
        }
        let ljj = diag.sqrt();
        l[[j, j]] = ljj;

        for i in (j + 1)..n {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = s / ljj;
        }
    }
    Ok(l)
}

/// Solve `A X = B` for symmetric positive-definite `A`.
///
/// `B` has shape `[n, n_rhs]`; each column is solved independently against
/// the same factorization.
pub fn solve_spd(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<Array2<f64>, FitError> {
    let l = cholesky(a)?;
    let n = l.nrows();
    let mut x = b.to_owned();

    for col in 0..x.ncols() {
        // Forward: L y = b
        for i in 0..n {
            let mut s = x[[i, col]];
            for k in 0..i {
                s -= l[[i, k]] * x[[k, col]];
            }
            x[[i, col]] = s / l[[i, i]];
        }
        // Backward: Lᵀ x = y
        for i in (0..n).rev() {
            let mut s = x[[i, col]];
            for k in (i + 1)..n {
                s -= l[[k, i]] * x[[k, col]];
            }
            x[[i, col]] = s / l[[i, i]];
        }
    }
    Ok(x)
}
