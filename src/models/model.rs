//! Model evaluation for multi-component line profiles.
//!
//! The fitter relies on two primitive operations:
//! - predict `f(x)` for a flat parameter vector (for χ² and residuals)
//! - fill the Jacobian row `∂f(x)/∂p` (for Levenberg–Marquardt)
//!
//! Parameters are laid out component by component; for `FitKind::Gaussian` each
//! component is `[amplitude, centroid, sigma]`.

use crate::domain::FitKind;

/// `FWHM = FWHM_PER_SIGMA * σ` for a Gaussian.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Predict `f(x)` for the given model kind.
pub fn predict(kind: FitKind, x: f64, params: &[f64]) -> f64 {
    match kind {
        FitKind::Gaussian => params
            .chunks_exact(3)
            .map(|c| {
                let u = (x - c[1]) / c[2];
                c[0] * (-0.5 * u * u).exp()
            })
            .sum(),
    }
}

/// Fill the Jacobian row `∂f(x)/∂p` for the given model kind.
///
/// # Panics
/// Panics if `out` is shorter than `params`. Callers size these arrays together.
pub fn fill_jacobian_row(kind: FitKind, x: f64, params: &[f64], out: &mut [f64]) {
    match kind {
        FitKind::Gaussian => {
            for (c, d) in params.chunks_exact(3).zip(out.chunks_exact_mut(3)) {
                let (amp, cen, sigma) = (c[0], c[1], c[2]);
                let u = (x - cen) / sigma;
                let e = (-0.5 * u * u).exp();
                d[0] = e;
                d[1] = amp * e * u / sigma;
                d[2] = amp * e * u * u / sigma;
            }
        }
    }
}

/// Evaluate the model over a whole axis.
pub fn predict_axis(kind: FitKind, axis: &[f64], params: &[f64]) -> Vec<f64> {
    axis.iter().map(|&x| predict(kind, x, params)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_peak_and_half_width() {
        let params = [2.0, 5.0, 1.5];
        assert!((predict(FitKind::Gaussian, 5.0, &params) - 2.0).abs() < 1e-12);

        let half = 0.5 * FWHM_PER_SIGMA * 1.5;
        let y = predict(FitKind::Gaussian, 5.0 + half, &params);
        assert!((y - 1.0).abs() < 1e-9, "value at HWHM should be half the peak, got {y}");
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let params = [1.3, -2.0, 0.8, 0.6, 1.0, 2.2];
        let x = -1.1;
        let mut row = [0.0; 6];
        fill_jacobian_row(FitKind::Gaussian, x, &params, &mut row);

        let h = 1e-6;
        for j in 0..params.len() {
            let mut hi = params;
            let mut lo = params;
            hi[j] += h;
            lo[j] -= h;
            let numeric = (predict(FitKind::Gaussian, x, &hi) - predict(FitKind::Gaussian, x, &lo)) / (2.0 * h);
            assert!((numeric - row[j]).abs() < 1e-6, "param {j}: {numeric} vs {}", row[j]);
        }
    }
}
