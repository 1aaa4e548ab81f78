//! Historical return covariance estimates.

use ndarray::{Array2, ArrayView2, Axis};
use statrs::statistics::Statistics;

use super::optimizer::OptimizerError;

/// Simple returns `x[t] / x[t-1] - 1` of each column. One row shorter than
/// `levels`; a zero previous level yields a zero return.
pub fn returns_from_levels(levels: ArrayView2<'_, f64>) -> Array2<f64> {
    let rows = levels.nrows().saturating_sub(1);
    Array2::from_shape_fn((rows, levels.ncols()), |(t, j)| {
        let prev = levels[[t, j]];
        if prev.abs() > f64::EPSILON {
            levels[[t + 1, j]] / prev - 1.0
        } else {
            0.0
        }
    })
}

/// Unbiased sample covariance of the columns of `returns` (rows are
/// observations).
pub fn sample_covariance(returns: ArrayView2<'_, f64>) -> Result<Array2<f64>, OptimizerError> {
    let (rows, cols) = returns.dim();
    if rows < 2 {
        return Err(OptimizerError::InsufficientObservations(rows));
    }
    if returns.iter().any(|v| !v.is_finite()) {
        return Err(OptimizerError::NonFiniteInput);
    }

    let columns: Vec<Vec<f64>> = returns.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();
    let mut cov = Array2::zeros((cols, cols));
    for i in 0..cols {
        for j in i..cols {
            let c = columns[i].iter().covariance(columns[j].iter());
            cov[[i, j]] = c;
            cov[[j, i]] = c;
        }
    }
    Ok(cov)
}

/// Shrink toward a scaled identity: `(1 − δ)·Σ + δ·(tr Σ / n)·I`.
///
/// Any δ > 0 makes a positive semi-definite Σ with positive trace
/// positive-definite.
pub fn shrink_covariance(cov: ArrayView2<'_, f64>, intensity: f64) -> Result<Array2<f64>, OptimizerError> {
    if !(0.0..=1.0).contains(&intensity) {
        return Err(OptimizerError::InvalidShrinkage(intensity));
    }
    let n = cov.nrows();
    if cov.ncols() != n {
        return Err(OptimizerError::DimensionMismatch {
            expected: n,
            got: cov.ncols(),
        });
    }
    if n == 0 {
        return Err(OptimizerError::NoAssets);
    }
    let target = cov.diag().sum() / n as f64;
    let mut shrunk = cov.to_owned() * (1.0 - intensity);
    for i in 0..n {
        shrunk[[i, i]] += intensity * target;
    }
    Ok(shrunk)
}
