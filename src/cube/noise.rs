//! Per-spectrum noise estimation.
//!
//! Line emission is positive, so the negative channels of a spectrum are
//! (mostly) pure noise. Reflecting them about zero gives a symmetric sample
//! whose median absolute deviation sets a clipping level; the rms of all
//! channels inside that level is the noise estimate.

use crate::math::median_absolute_deviation;

/// Fraction of negative channels expected of a noise-dominated spectrum.
const NOISE_NEGATIVE_FRACTION: f64 = 0.47;

/// Estimate the rms noise of `spectrum`, falling back to `fallback` when the
/// spectrum contains NaNs, has no negative channels, or yields no usable value.
pub fn estimate_rms(spectrum: &[f64], fallback: f64) -> f64 {
    if spectrum.is_empty() || spectrum.iter().any(|v| v.is_nan()) {
        return fallback;
    }

    let negatives: Vec<f64> = spectrum.iter().copied().filter(|v| *v < 0.0).collect();
    if negatives.is_empty() {
        return fallback;
    }

    let reflected: Vec<f64> = negatives.iter().flat_map(|v| [*v, v.abs()]).collect();
    let Some(mad) = median_absolute_deviation(&reflected) else {
        return fallback;
    };

    let clip = if (negatives.len() as f64) < NOISE_NEGATIVE_FRACTION * spectrum.len() as f64 {
        3.5 * mad
    } else {
        4.0 * mad
    };

    let noise: Vec<f64> = spectrum.iter().copied().filter(|v| v.abs() < clip).collect();
    if noise.is_empty() {
        return fallback;
    }
    let rms = (noise.iter().map(|v| v * v).sum::<f64>() / noise.len() as f64).sqrt();

    if rms.is_finite() && rms > 0.0 { rms } else { fallback }
}
