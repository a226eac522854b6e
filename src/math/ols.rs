//! Linear least squares solver.
//!
//! Every damped Levenberg–Marquardt step is a small linear least squares
//! problem of the form:
//!
//! ```text
//! minimize ‖J δ - r‖² + λ ‖D δ‖²
//! ```
//!
//! which we solve by stacking `[J; √λ D]` and `[r; 0]` and handing the tall
//! system to an SVD. Parameter counts are tiny (three per line component), so
//! SVD cost is negligible next to model evaluation, and it stays well behaved
//! when two components are nearly degenerate.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    // Overlapping components make columns nearly collinear; try progressively
    // looser singular-value cutoffs before giving up.
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped normal step `[J; √λ D] δ = [r; 0]`.
pub fn solve_damped_step(
    jac: &DMatrix<f64>,
    residuals: &DVector<f64>,
    lambda: f64,
    scale: &[f64],
) -> Option<DVector<f64>> {
    let (n, p) = jac.shape();
    let mut a = DMatrix::<f64>::zeros(n + p, p);
    let mut b = DVector::<f64>::zeros(n + p);

    a.view_mut((0, 0), (n, p)).copy_from(jac);
    b.rows_mut(0, n).copy_from(residuals);

    let root = lambda.max(0.0).sqrt();
    for j in 0..p {
        a[(n + j, j)] = root * scale[j];
    }

    solve_least_squares(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn damped_step_shrinks_with_lambda() {
        let jac = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
        let r = DVector::from_row_slice(&[1.0, 1.0, 1.0]);

        let free = solve_damped_step(&jac, &r, 0.0, &[1.0]).unwrap();
        let damped = solve_damped_step(&jac, &r, 3.0, &[1.0]).unwrap();

        assert!((free[0] - 1.0).abs() < 1e-10);
        // (JᵀJ + λ) δ = Jᵀr  ->  (3 + 3) δ = 3
        assert!((damped[0] - 0.5).abs() < 1e-10);
    }
}
