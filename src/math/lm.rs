//! Levenberg–Marquardt non-linear least squares.
//!
//! The solver is model-agnostic: the caller supplies a closure that, for a
//! parameter vector, fills the noise-weighted residuals `r_i = (y_i - f_i) / σ`
//! and the matching Jacobian `J_ij = ∂f_i/∂p_j / σ`. Each iteration solves the
//! damped step with Marquardt's diagonal scaling and adapts `λ` up or down
//! depending on whether χ² improved.

use nalgebra::{DMatrix, DVector};

use crate::math::ols::solve_damped_step;

/// Stopping rules for the solver.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Relative χ² decrease below which an accepted step counts as converged.
    pub ftol: f64,
    /// Relative step size below which an accepted step counts as converged.
    pub xtol: f64,
    pub lambda0: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            lambda0: 1e-3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    pub chisq: f64,
    /// `(JᵀJ)⁻¹` at the solution, when it could be formed.
    pub covariance: Option<DMatrix<f64>>,
    pub converged: bool,
    pub iterations: usize,
}

const LAMBDA_MAX: f64 = 1e12;
const SCALE_FLOOR: f64 = 1e-12;

/// Minimise χ² starting from `init`.
///
/// `eval(params, residuals, jacobian)` must return `false` when the model is
/// not finite at `params`. Returns `None` if the starting point itself cannot
/// be evaluated.
pub fn levenberg_marquardt<F>(
    n_obs: usize,
    init: &[f64],
    opts: &LmOptions,
    mut eval: F,
) -> Option<LmSolution>
where
    F: FnMut(&[f64], &mut DVector<f64>, &mut DMatrix<f64>) -> bool,
{
    let p = init.len();
    if p == 0 || n_obs < p {
        return None;
    }

    let mut params = init.to_vec();
    let mut r = DVector::<f64>::zeros(n_obs);
    let mut jac = DMatrix::<f64>::zeros(n_obs, p);
    if !eval(&params, &mut r, &mut jac) {
        return None;
    }
    let mut chisq = r.norm_squared();

    let mut trial_r = DVector::<f64>::zeros(n_obs);
    let mut trial_jac = DMatrix::<f64>::zeros(n_obs, p);
    let mut lambda = opts.lambda0;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < opts.max_iter {
        iterations += 1;

        let scale: Vec<f64> = (0..p)
            .map(|j| jac.column(j).norm().max(SCALE_FLOOR))
            .collect();

        let Some(step) = solve_damped_step(&jac, &r, lambda, &scale) else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
            continue;
        };

        let param_norm = params.iter().map(|v| v * v).sum::<f64>().sqrt();
        let small_step = step.norm() < opts.xtol * (param_norm + opts.xtol);

        let trial: Vec<f64> = params.iter().zip(step.iter()).map(|(a, d)| a + d).collect();
        let ok = eval(&trial, &mut trial_r, &mut trial_jac);
        let trial_chisq = trial_r.norm_squared();

        if ok && trial_chisq.is_finite() && trial_chisq <= chisq {
            let rel_drop = (chisq - trial_chisq) / chisq.max(f64::MIN_POSITIVE);

            params = trial;
            chisq = trial_chisq;
            std::mem::swap(&mut r, &mut trial_r);
            std::mem::swap(&mut jac, &mut trial_jac);
            lambda = (lambda / 10.0).max(1e-12);

            if rel_drop < opts.ftol || small_step {
                converged = true;
                break;
            }
        } else {
            // At the minimum rounding noise rejects every step; a vanishing
            // step means there is nowhere left to go.
            if small_step {
                converged = true;
                break;
            }
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
        }
    }

    let covariance = (jac.transpose() * &jac).pseudo_inverse(1e-12).ok();

    Some(LmSolution {
        params,
        chisq,
        covariance,
        converged,
        iterations,
    })
}
