//! Small dense linear-algebra helpers shared by the ridge baseline and the
//! portfolio optimizer.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Relative tolerance for symmetry checks.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Lower-triangular Cholesky factor `L` with `A = L Lᵀ`.
///
/// Returns `None` when `a` is not square or not positive-definite.
pub(crate) fn cholesky(a: ArrayView2<'_, f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L Lᵀ x = b` given the Cholesky factor `L`.
pub(crate) fn cholesky_solve(l: &Array2<f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = l.nrows();

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Lᵀ x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }
    x
}

pub(crate) fn is_symmetric(a: ArrayView2<'_, f64>) -> bool {
    let n = a.nrows();
    if a.ncols() != n {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let scale = a[[i, j]].abs().max(a[[j, i]].abs()).max(1.0);
            if (a[[i, j]] - a[[j, i]]).abs() > SYMMETRY_TOLERANCE * scale {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cholesky_and_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let l = cholesky(a.view()).unwrap();
        assert!((l[[0, 0]] - 2.0).abs() < 1e-12);
        assert!((l[[1, 0]] - 1.0).abs() < 1e-12);
        assert_eq!(l[[0, 1]], 0.0);

        let b = array![2.0, 5.0];
        let x = cholesky_solve(&l, b.view());
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-12);
        assert!((back[1] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        assert!(cholesky(array![[1.0, 2.0], [2.0, 1.0]].view()).is_none());
        assert!(cholesky(array![[0.0]].view()).is_none());
        assert!(cholesky(array![[1.0, 0.0]].view()).is_none());
    }

    #[test]
    fn test_symmetry() {
        assert!(is_symmetric(array![[1.0, 0.5], [0.5, 2.0]].view()));
        assert!(!is_symmetric(array![[1.0, 0.5], [0.4, 2.0]].view()));
    }
}
