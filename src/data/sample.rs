//! Synthetic cube and region hierarchy generation.
//!
//! The field holds two Gaussian velocity components whose amplitude and
//! centroid drift smoothly across the map, plus a little per-pixel centroid
//! jitter and white noise. Averaging regions tile the map with squares of each
//! requested width; each region is seeded by a free fit to its averaged
//! spectrum, exactly as the individual pixels will later be fit from it.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::debug;

use crate::cube::{CubeMeta, CubeShape, CubeSource, DataCube, estimate_rms};
use crate::domain::{AveragingRegion, FitKind, RegionContainer};
use crate::error::AppError;
use crate::fit::decomposer::Decomposer;
use crate::models::{FWHM_PER_SIGMA, predict};

/// CO (1-0) rest frequency.
pub const CO_REST_FREQUENCY_HZ: f64 = 115.271_201_8e9;

/// Peaks must clear this many rms to seed a component.
const PEAK_SNR: f64 = 3.0;
const MAX_SEED_COMPONENTS: usize = 3;

#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub seed: u64,
    pub nx: usize,
    pub ny: usize,
    pub nchan: usize,
    /// First channel velocity (km/s).
    pub v0: f64,
    /// Channel width (km/s).
    pub dv: f64,
    pub noise: f64,
    /// Averaging-region widths, coarse to fine.
    pub widths: Vec<usize>,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            seed: 42,
            nx: 8,
            ny: 8,
            nchan: 120,
            v0: -20.0,
            dv: 0.4,
            noise: 0.05,
            widths: vec![4, 2],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleData {
    pub cube: DataCube,
    pub hierarchy: Vec<RegionContainer>,
}

pub fn generate_sample(spec: &SampleSpec, fitter: &Decomposer) -> Result<SampleData, AppError> {
    if spec.nx == 0 || spec.ny == 0 || spec.nchan < 8 {
        return Err(AppError::invalid_input(format!(
            "Synthetic cube needs nx, ny >= 1 and at least 8 channels (got {}x{}x{}).",
            spec.nx, spec.ny, spec.nchan
        )));
    }
    if !(spec.dv.is_finite() && spec.dv > 0.0 && spec.noise.is_finite() && spec.noise > 0.0) {
        return Err(AppError::invalid_input("Channel width and noise must be finite and > 0."));
    }
    if spec.widths.is_empty() || spec.widths.contains(&0) {
        return Err(AppError::invalid_input("Region widths must be non-empty and >= 1."));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let noise = Normal::new(0.0, spec.noise)
        .map_err(|e| AppError::internal(format!("Noise distribution error: {e}")))?;
    let jitter = Normal::new(0.0, 0.2)
        .map_err(|e| AppError::internal(format!("Jitter distribution error: {e}")))?;

    let axis: Vec<f64> = (0..spec.nchan).map(|i| spec.v0 + spec.dv * i as f64).collect();
    let shape = CubeShape {
        nchan: spec.nchan,
        ny: spec.ny,
        nx: spec.nx,
    };
    let plane = spec.ny * spec.nx;

    let mut data = vec![0.0; spec.nchan * plane];
    for y in 0..spec.ny {
        for x in 0..spec.nx {
            let fx = x as f64 / spec.nx as f64;
            let fy = y as f64 / spec.ny as f64;
            let params = vec![
                1.0 + 0.3 * (std::f64::consts::PI * fx).sin(),
                -5.0 + 2.0 * fx + jitter.sample(&mut rng),
                1.5,
                0.6,
                5.0 - fy + jitter.sample(&mut rng),
                2.0,
            ];
            let offset = y * spec.nx + x;
            for (c, &v) in axis.iter().enumerate() {
                data[c * plane + offset] = predict(FitKind::Gaussian, v, &params) + noise.sample(&mut rng);
            }
        }
    }

    let meta = CubeMeta {
        bunit: Some("K".to_string()),
        spectral_unit: Some("km/s".to_string()),
        rest_frequency_hz: Some(CO_REST_FREQUENCY_HZ),
        cdelt3: Some(spec.dv),
    };
    let cube = DataCube::new(meta, axis.clone(), shape, data)?;

    let hierarchy = spec
        .widths
        .iter()
        .map(|&width| build_container(&cube, &axis, width, spec.noise, fitter))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SampleData { cube, hierarchy })
}

/// Tile the map with `width`-sided squares and seed each one.
fn build_container(
    cube: &DataCube,
    axis: &[f64],
    width: usize,
    rms_approx: f64,
    fitter: &Decomposer,
) -> Result<RegionContainer, AppError> {
    let CubeShape { nchan, ny, nx } = cube.shape();
    let min_members = (width * width).div_ceil(2);
    let mut regions = Vec::new();

    for row0 in (0..ny).step_by(width) {
        for col0 in (0..nx).step_by(width) {
            let indices: Vec<[usize; 2]> = (row0..(row0 + width).min(ny))
                .flat_map(|r| (col0..(col0 + width).min(nx)).map(move |c| [r, c]))
                .collect();

            let mut region = AveragingRegion::new(regions.len(), indices, false);

            if region.indices.len() >= min_members {
                let mut mean = vec![0.0; nchan];
                for coord in region.coordinates() {
                    for (m, v) in mean.iter_mut().zip(cube.spectrum(coord)?) {
                        *m += v;
                    }
                }
                let n = region.indices.len() as f64;
                mean.iter_mut().for_each(|m| *m /= n);

                let rms = estimate_rms(&mean, rms_approx / n.sqrt());
                let guesses = initial_guesses(axis, &mean, rms, MAX_SEED_COMPONENTS);
                if let Some(model) = fitter.fit_free(FitKind::Gaussian, axis, &mean, rms, &guesses) {
                    region.set_model(model)?;
                    region.to_be_fit = true;
                }
            }

            debug!(width, region = region.index, to_be_fit = region.to_be_fit, "averaging region");
            regions.push(region);
        }
    }

    Ok(RegionContainer { width, regions })
}

/// Peak-based starting guesses: local maxima of the 3-channel smoothed
/// spectrum above `PEAK_SNR`·rms, strongest first, at most `max` of them and
/// none within the FWHM of a stronger one.
pub fn initial_guesses(axis: &[f64], flux: &[f64], rms: f64, max: usize) -> Vec<f64> {
    let n = flux.len();
    if n < 3 || axis.len() != n {
        return Vec::new();
    }
    let dv = (axis[1] - axis[0]).abs();

    let smooth: Vec<f64> = (0..n)
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(n - 1);
            flux[lo..=hi].iter().sum::<f64>() / (hi - lo + 1) as f64
        })
        .collect();

    let mut peaks: Vec<usize> = (1..n - 1)
        .filter(|&i| smooth[i] > smooth[i - 1] && smooth[i] >= smooth[i + 1] && smooth[i] > PEAK_SNR * rms)
        .collect();
    peaks.sort_by(|a, b| smooth[*b].partial_cmp(&smooth[*a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut accepted: Vec<(f64, f64, f64)> = Vec::new();
    for i in peaks {
        if accepted.len() >= max {
            break;
        }
        let amp = smooth[i];
        let half = 0.5 * amp;
        let left = (0..i).rev().find(|&j| smooth[j] < half).unwrap_or(0);
        let right = (i + 1..n).find(|&j| smooth[j] < half).unwrap_or(n - 1);
        let hwhm = 0.5 * (right - left) as f64 * dv;
        let sigma = (2.0 * hwhm / FWHM_PER_SIGMA).max(dv);

        let centroid = axis[i];
        if accepted.iter().any(|&(_, c, s)| (c - centroid).abs() < FWHM_PER_SIGMA * s) {
            continue;
        }
        accepted.push((amp, centroid, sigma));
    }

    accepted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    accepted.into_iter().flat_map(|(a, c, s)| [a, c, s]).collect()
}
