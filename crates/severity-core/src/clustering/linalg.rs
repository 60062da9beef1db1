//! Dense linear algebra for the GMM and spectral models, on `nalgebra`.

use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};

use super::error::{ClusterError, ClusterResult};

/// Implicit QR iteration cap per matrix row, as in LAPACK's `MAXIT`.
const QR_ITERATIONS_PER_ROW: usize = 30;

/// Lower Cholesky factor of a symmetric positive definite matrix.
///
/// Returns `None` if `a` is not positive definite.
pub fn cholesky(a: &[Vec<f64>]) -> Option<DMatrix<f64>> {
    let n = a.len();
    let l = Cholesky::new(DMatrix::from_fn(n, n, |i, j| a[i][j]))?.unpack();
    if l.diagonal().iter().all(|d| *d > 0.0 && d.is_finite()) {
        Some(l)
    } else {
        None
    }
}

/// `‖L⁻¹ b‖²` for lower triangular `L`: the squared Mahalanobis length of
/// `b` under the covariance `L Lᵀ`.
pub fn mahalanobis_sq(l: &DMatrix<f64>, b: &[f64]) -> f64 {
    l.solve_lower_triangular(&DVector::from_column_slice(b))
        .map(|y| y.norm_squared())
        .unwrap_or(f64::INFINITY)
}

/// The `k` largest eigenpairs of a real symmetric matrix.
///
/// Returns `(eigenvalues, eigenvectors)` in descending eigenvalue order, ties
/// in decomposition order; `eigenvectors[i]` pairs with `eigenvalues[i]`.
///
/// # Errors
///
/// `NumericalFailure` if the QR iterations do not converge.
pub fn top_eigenpairs(matrix: DMatrix<f64>, k: usize) -> ClusterResult<(Vec<f64>, Vec<Vec<f64>>)> {
    let n = matrix.nrows();
    let max_iter = QR_ITERATIONS_PER_ROW * n.max(1);
    let eigen = SymmetricEigen::try_new(matrix, f64::EPSILON, max_iter).ok_or_else(|| {
        ClusterError::numerical(format!(
            "symmetric eigen-decomposition of a {}x{} matrix did not converge in {} iterations",
            n, n, max_iter
        ))
    })?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .total_cmp(&eigen.eigenvalues[a])
            .then(a.cmp(&b))
    });
    order.truncate(k);

    let values = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let vectors = order
        .iter()
        .map(|&i| eigen.eigenvectors.column(i).iter().copied().collect())
        .collect();
    Ok((values, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_cholesky_known_matrix() {
        let a = vec![
            vec![4.0, 12.0, -16.0],
            vec![12.0, 37.0, -43.0],
            vec![-16.0, -43.0, 98.0],
        ];
        let l = cholesky(&a).unwrap();
        let expected = [[2.0, 0.0, 0.0], [6.0, 1.0, 0.0], [-8.0, 5.0, 3.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert!(approx(l[(i, j)], expected[i][j]), "l[{}][{}]={}", i, j, l[(i, j)]);
            }
        }
        // L y = (2, 7, 6) has y = (1, 1, 3).
        assert!(approx(mahalanobis_sq(&l, &[2.0, 7.0, 6.0]), 11.0));
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        assert!(cholesky(&[vec![1.0, 2.0], vec![2.0, 1.0]]).is_none());
        assert!(cholesky(&[vec![0.0, 0.0], vec![0.0, 1.0]]).is_none());
    }

    #[test]
    fn test_top_eigenpairs_descending() {
        let a = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0]);
        let (values, vectors) = top_eigenpairs(a.clone(), 2).unwrap();

        let s2 = 2.0_f64.sqrt();
        assert_eq!(values.len(), 2);
        assert!(approx(values[0], 2.0 + s2));
        assert!(approx(values[1], 2.0));

        for (lambda, v) in values.iter().zip(vectors.iter()) {
            let av = &a * DVector::from_column_slice(v);
            for i in 0..3 {
                assert!((av[i] - lambda * v[i]).abs() < 1e-8, "A v != lambda v");
            }
        }
        println!("[PASS] test_top_eigenpairs_descending - eigenvalues={:?}", values);
    }
}
