//! Native spectrum fitter.
//!
//! Each attempt runs Levenberg–Marquardt on the noise-weighted residuals,
//! starting from the attempt's guesses, and then checks the result against
//! the parent solution (see [`crate::fit::guardrails`]). The fitter never
//! returns refined guesses that are as long as the ones it was given.

use tracing::trace;

use crate::domain::{FitKind, FitResult};
use crate::error::AppError;
use crate::fit::executor::{FitOutcome, FitProblem, SpectrumFitter};
use crate::fit::guardrails::{Assessment, assess, drop_weakest};
use crate::math::{LmOptions, LmSolution, levenberg_marquardt};
use crate::models::{fill_jacobian_row, predict};

/// Widths below this are treated as a collapsed component.
const MIN_SIGMA: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct Decomposer {
    pub lm: LmOptions,
}

impl Decomposer {
    pub fn new(lm: LmOptions) -> Self {
        Self { lm }
    }

    fn solve(&self, kind: FitKind, axis: &[f64], flux: &[f64], rms: f64, guesses: &[f64]) -> Option<LmSolution> {
        let npar = guesses.len();
        let mut row = vec![0.0; npar];

        levenberg_marquardt(axis.len(), guesses, &self.lm, |p, r, jac| {
            if p.iter().any(|v| !v.is_finite()) {
                return false;
            }
            if p.chunks_exact(kind.params_per_component()).any(|c| c[2].abs() < MIN_SIGMA) {
                return false;
            }
            for (i, (&x, &y)) in axis.iter().zip(flux).enumerate() {
                r[i] = (y - predict(kind, x, p)) / rms;
                fill_jacobian_row(kind, x, p, &mut row);
                for (k, d) in row.iter().enumerate() {
                    jac[(i, k)] = d / rms;
                }
            }
            r.iter().all(|v| v.is_finite())
        })
    }

    /// Fit without any parent comparison.
    ///
    /// Used to seed averaging regions. Returns `None` unless the solver
    /// converged to strictly positive amplitudes and widths.
    pub fn fit_free(
        &self,
        kind: FitKind,
        axis: &[f64],
        flux: &[f64],
        rms: f64,
        guesses: &[f64],
    ) -> Option<FitResult> {
        let npc = kind.params_per_component();
        if guesses.is_empty() || guesses.len() % npc != 0 || axis.len() != flux.len() {
            return None;
        }
        let sol = self.solve(kind, axis, flux, rms, guesses)?;
        if !sol.converged {
            return None;
        }
        let params = abs_widths(kind, &sol.params);
        let physical = params.chunks_exact(npc).all(|c| c[0] > 0.0 && c[2] > 0.0);
        physical.then(|| fit_result(kind, axis, flux, rms, &sol, params))
    }
}

impl SpectrumFitter for Decomposer {
    fn fit(&self, problem: &FitProblem<'_>) -> Result<FitOutcome, AppError> {
        let npc = problem.kind.params_per_component();
        if problem.guesses.is_empty() {
            return Ok(FitOutcome::exhausted());
        }
        if problem.guesses.len() % npc != 0 || problem.parent_guesses.len() % npc != 0 {
            return Err(AppError::invalid_input(format!(
                "{} guesses must come in groups of {npc} (got {} and {} parent values).",
                problem.kind.display_name(),
                problem.guesses.len(),
                problem.parent_guesses.len()
            )));
        }
        if problem.axis.len() != problem.flux.len() {
            return Err(AppError::invalid_input(format!(
                "Axis has {} channels but the spectrum has {}.",
                problem.axis.len(),
                problem.flux.len()
            )));
        }

        let init = abs_widths(problem.kind, problem.guesses);
        let Some(sol) = self.solve(problem.kind, problem.axis, problem.flux, problem.rms, &init) else {
            trace!(ncomps = init.len() / npc, "solver could not start; dropping a component");
            return Ok(shrink_or_stop(drop_weakest(&init)));
        };

        let fitted = abs_widths(problem.kind, &sol.params);
        let verdict = assess(
            &fitted,
            problem.parent_guesses,
            problem.rms,
            problem.resolution,
            problem.tol,
            sol.converged,
        );
        trace!(
            ncomps = fitted.len() / npc,
            iterations = sol.iterations,
            converged = sol.converged,
            ?verdict,
            "fit attempt"
        );

        Ok(match verdict {
            Assessment::Accept => {
                let result = fit_result(problem.kind, problem.axis, problem.flux, problem.rms, &sol, fitted.clone());
                FitOutcome::converged(result, fitted)
            }
            Assessment::Refine(guesses) => shrink_or_stop(guesses),
            Assessment::Exhausted => FitOutcome::exhausted(),
        })
    }
}

fn shrink_or_stop(guesses: Vec<f64>) -> FitOutcome {
    if guesses.is_empty() {
        FitOutcome::exhausted()
    } else {
        FitOutcome::refine(guesses)
    }
}

fn abs_widths(kind: FitKind, params: &[f64]) -> Vec<f64> {
    let npc = kind.params_per_component();
    let mut out = params.to_vec();
    for c in out.chunks_exact_mut(npc) {
        c[2] = c[2].abs();
    }
    out
}

fn fit_result(
    kind: FitKind,
    axis: &[f64],
    flux: &[f64],
    rms: f64,
    sol: &LmSolution,
    params: Vec<f64>,
) -> FitResult {
    let n = axis.len();
    let k = params.len();

    let errors = match &sol.covariance {
        Some(cov) => (0..k).map(|i| cov[(i, i)].max(0.0).sqrt()).collect(),
        None => vec![0.0; k],
    };

    let sse: f64 = axis
        .iter()
        .zip(flux)
        .map(|(&x, &y)| {
            let d = y - predict(kind, x, &params);
            d * d
        })
        .sum();
    let dof = n.saturating_sub(k).max(1);

    FitResult {
        kind,
        ncomps: kind.component_count(&params),
        errors,
        aic: sol.chisq + 2.0 * k as f64,
        chisq: sol.chisq,
        redchisq: sol.chisq / dof as f64,
        rms,
        residual_rms: (sse / n.max(1) as f64).sqrt(),
        params,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    use super::*;
    use crate::domain::Tolerances;
    use crate::models::predict_axis;

    const TRUTH: [f64; 6] = [1.0, -5.0, 1.5, 0.6, 4.0, 2.0];
    const RMS: f64 = 0.05;

    fn spectrum(seed: u64) -> (Vec<f64>, Vec<f64>) {
        let axis: Vec<f64> = (0..81).map(|i| -20.0 + 0.5 * i as f64).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, RMS).unwrap();
        let flux = predict_axis(FitKind::Gaussian, &axis, &TRUTH)
            .into_iter()
            .map(|y| y + noise.sample(&mut rng))
            .collect();
        (axis, flux)
    }

    fn problem<'a>(
        axis: &'a [f64],
        flux: &'a [f64],
        guesses: &'a [f64],
        parent: &'a [f64],
        tol: &'a Tolerances,
    ) -> FitProblem<'a> {
        FitProblem {
            axis,
            flux,
            rms: RMS,
            guesses,
            parent_guesses: parent,
            tol,
            resolution: 0.5,
            kind: FitKind::Gaussian,
        }
    }

    #[test]
    fn converges_on_two_components() {
        let (axis, flux) = spectrum(7);
        let tol = Tolerances::default();
        let guesses = [0.9, -4.5, 1.3, 0.5, 4.5, 2.2];

        let out = Decomposer::default()
            .fit(&problem(&axis, &flux, &guesses, &guesses, &tol))
            .unwrap();
        let model = out.model.expect("two clean components should converge");

        assert_eq!(model.ncomps, 2);
        assert_eq!(out.guesses_updated, model.params);
        for (fit, truth) in model.params.iter().zip(TRUTH) {
            assert!((fit - truth).abs() < 0.2, "{:?} vs {:?}", model.params, TRUTH);
        }
        assert!((model.aic - (model.chisq + 12.0)).abs() < 1e-9);
        assert!(model.errors.iter().all(|e| e.is_finite() && *e > 0.0));
        assert!((model.residual_rms - RMS).abs() < 0.02);
    }

    #[test]
    fn spurious_component_is_refined_away() {
        let (axis, flux) = spectrum(11);
        let tol = Tolerances::default();
        let guesses = [0.9, -4.5, 1.3, 0.5, 4.5, 2.2, 0.3, 15.0, 1.0];
        let parent = [1.0, -5.0, 1.5, 0.6, 4.0, 2.0];

        let out = Decomposer::default()
            .fit(&problem(&axis, &flux, &guesses, &parent, &tol))
            .unwrap();
        assert!(out.model.is_none());
        assert!(!out.guesses_updated.is_empty());
        assert!(out.guesses_updated.len() < guesses.len());
        assert_eq!(out.guesses_updated.len() % 3, 0);
    }

    #[test]
    fn flat_spectrum_is_exhausted() {
        let axis: Vec<f64> = (0..40).map(|i| i as f64 * 0.5).collect();
        let flux = vec![0.0; axis.len()];
        let tol = Tolerances::default();
        let guesses = [1.0, 10.0, 1.5];

        let out = Decomposer::default()
            .fit(&problem(&axis, &flux, &guesses, &guesses, &tol))
            .unwrap();
        assert_eq!(out, FitOutcome::exhausted());
    }

    #[test]
    fn empty_guesses_are_exhausted_and_ragged_guesses_rejected() {
        let (axis, flux) = spectrum(1);
        let tol = Tolerances::default();
        let parent = [1.0, -5.0, 1.5];
        let d = Decomposer::default();

        assert_eq!(d.fit(&problem(&axis, &flux, &[], &parent, &tol)).unwrap(), FitOutcome::exhausted());
        let err = d.fit(&problem(&axis, &flux, &[1.0, 2.0], &parent, &tol)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn fit_free_recovers_region_average() {
        let (axis, flux) = spectrum(3);
        let model = Decomposer::default()
            .fit_free(FitKind::Gaussian, &axis, &flux, RMS, &[0.8, -4.0, 1.0, 0.8, 5.0, 1.0])
            .expect("free fit should converge");
        assert_eq!(model.ncomps, 2);
        assert!(model.aic.is_finite());
        assert!((model.params[1] + 5.0).abs() < 0.3);
        assert!((model.params[4] - 4.0).abs() < 0.3);
    }
}
