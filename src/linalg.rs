//! ndarray <-> faer glue for the two factorizations the crate needs:
//! the covariance factor behind `simulate` and the normal equations of the
//! relaxed OLS refit.

use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use crate::error::{SimError, Result};

/// pivots below this (relative to the largest diagonal entry) count as rank loss
const RANK_TOLERANCE: f64 = 1e-12;

fn to_faer(a: ArrayView2<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn lower_to_array(l: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((l.nrows(), l.ncols()), |(i, j)| if j <= i { l[(i, j)] } else { 0.0 })
}

fn factor(a: ArrayView2<f64>) -> Result<Llt<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(SimError::dimension_mismatch(
            format!("cholesky needs a square matrix, got {}x{}", n, a.ncols())
        ));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(SimError::numerical_error("matrix has non-finite entries"));
    }

    let llt = Llt::new(to_faer(a).as_ref(), Side::Lower).map_err(|e| {
        SimError::numerical_error(format!("matrix is not positive definite: {:?}", e))
    })?;

    // faer accepts tiny positive pivots; a near-singular matrix is still singular to us
    let scale = (0..n).fold(0.0_f64, |acc, i| acc.max(a[[i, i]].abs())).max(f64::MIN_POSITIVE);
    let l = llt.L();
    if let Some(j) = (0..n).find(|&j| l[(j, j)] * l[(j, j)] <= RANK_TOLERANCE * scale) {
        return Err(SimError::numerical_error(
            format!("matrix is singular to working precision (pivot {})", j)
        ));
    }

    Ok(llt)
}

/// lower cholesky factor L of a symmetric positive definite matrix, A = L L'
pub fn cholesky(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let llt = factor(a)?;
    Ok(lower_to_array(llt.L()))
}

/// solve A x = b for symmetric positive definite A
pub fn solve_spd(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>> {
    if b.len() != a.nrows() {
        return Err(SimError::dimension_mismatch(
            format!("rhs len ({}) != matrix rows ({})", b.len(), a.nrows())
        ));
    }
    let llt = factor(a)?;
    let rhs = Mat::from_fn(b.len(), 1, |i, _| b[i]);
    let sol = llt.solve(rhs.as_ref());
    Ok(Array1::from_iter((0..b.len()).map(|i| sol[(i, 0)])))
}
