//! Parent-comparison guardrails for individual fits.
//!
//! A fitted component is kept only if it is a plausible descendant of the
//! seeding region's solution:
//!
//! - peak signal-to-noise of at least `snr_min`
//! - FWHM of at least `min_width_channels` channels
//! - sigma within a factor `width_ratio` of the nearest parent component
//! - centroid within `velocity_shift` parent sigmas of that component
//!
//! Surviving components that sit closer than `min_separation` of the narrower
//! FWHM are merged. Any rejection or merge yields a shorter guess vector for
//! the next attempt.

use crate::domain::Tolerances;
use crate::models::FWHM_PER_SIGMA;

/// One Gaussian component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    pub amplitude: f64,
    pub centroid: f64,
    pub sigma: f64,
}

impl Component {
    pub fn fwhm(&self) -> f64 {
        FWHM_PER_SIGMA * self.sigma
    }
}

/// Split a flat `[amp, cen, sigma, ...]` vector into components.
pub fn components(params: &[f64]) -> Vec<Component> {
    params
        .chunks_exact(3)
        .map(|c| Component {
            amplitude: c[0],
            centroid: c[1],
            sigma: c[2].abs(),
        })
        .collect()
}

pub fn flatten(components: &[Component]) -> Vec<f64> {
    components
        .iter()
        .flat_map(|c| [c.amplitude, c.centroid, c.sigma])
        .collect()
}

/// Why a component was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowSnr,
    TooNarrow,
    WidthMismatch,
    VelocityShift,
}

/// Verdict on a fitted parameter set.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    Accept,
    Refine(Vec<f64>),
    Exhausted,
}

/// Check one component against the tolerances and the parent solution.
pub fn check_component(
    c: &Component,
    parent: &[Component],
    rms: f64,
    resolution: f64,
    tol: &Tolerances,
) -> Result<(), Rejection> {
    if !(c.amplitude > 0.0 && c.amplitude >= tol.snr_min * rms) {
        return Err(Rejection::LowSnr);
    }
    if !(c.sigma > 0.0 && c.fwhm() >= tol.min_width_channels * resolution.abs()) {
        return Err(Rejection::TooNarrow);
    }

    let Some(nearest) = nearest_parent(c, parent) else {
        return Ok(());
    };
    let ratio = c.sigma / nearest.sigma;
    if !(ratio <= tol.width_ratio && ratio >= 1.0 / tol.width_ratio) {
        return Err(Rejection::WidthMismatch);
    }
    if (c.centroid - nearest.centroid).abs() > tol.velocity_shift * nearest.sigma {
        return Err(Rejection::VelocityShift);
    }
    Ok(())
}

fn nearest_parent<'a>(c: &Component, parent: &'a [Component]) -> Option<&'a Component> {
    parent
        .iter()
        .filter(|p| p.sigma > 0.0)
        .min_by(|a, b| {
            let da = (a.centroid - c.centroid).abs();
            let db = (b.centroid - c.centroid).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Merge components closer than `min_separation` of the narrower FWHM.
///
/// Returns components sorted by centroid.
pub fn merge_close(components: &[Component], min_separation: f64) -> Vec<Component> {
    let mut sorted = components.to_vec();
    sorted.sort_by(|a, b| a.centroid.partial_cmp(&b.centroid).unwrap_or(std::cmp::Ordering::Equal));

    let mut out: Vec<Component> = Vec::with_capacity(sorted.len());
    for c in sorted {
        match out.last_mut() {
            Some(prev) if (c.centroid - prev.centroid).abs() < min_separation * prev.fwhm().min(c.fwhm()) => {
                let w = prev.amplitude + c.amplitude;
                let centroid = if w > 0.0 {
                    (prev.amplitude * prev.centroid + c.amplitude * c.centroid) / w
                } else {
                    0.5 * (prev.centroid + c.centroid)
                };
                *prev = Component {
                    amplitude: w,
                    centroid,
                    sigma: prev.sigma.max(c.sigma),
                };
            }
            _ => out.push(c),
        }
    }
    out
}

/// Drop the weakest (lowest amplitude) component.
pub fn drop_weakest(params: &[f64]) -> Vec<f64> {
    let mut comps = components(params);
    if let Some(weakest) = comps
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.amplitude.partial_cmp(&b.1.amplitude).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
    {
        comps.remove(weakest);
    }
    flatten(&comps)
}

/// Judge a fitted parameter set against the parent solution.
///
/// `converged` reports whether the solver met its stopping rule; a clean but
/// unconverged fit is refined by dropping its weakest component.
pub fn assess(
    fitted: &[f64],
    parent_guesses: &[f64],
    rms: f64,
    resolution: f64,
    tol: &Tolerances,
    converged: bool,
) -> Assessment {
    let parent = components(parent_guesses);
    let fitted = components(fitted);

    let survivors: Vec<Component> = fitted
        .iter()
        .filter(|c| check_component(c, &parent, rms, resolution, tol).is_ok())
        .copied()
        .collect();

    if survivors.is_empty() || survivors.len().abs_diff(parent.len()) > tol.max_component_delta {
        return Assessment::Exhausted;
    }
    if survivors.len() < fitted.len() {
        return Assessment::Refine(flatten(&survivors));
    }

    let merged = merge_close(&survivors, tol.min_separation);
    if merged.len() < survivors.len() {
        return Assessment::Refine(flatten(&merged));
    }

    if converged {
        Assessment::Accept
    } else {
        let fewer = drop_weakest(&flatten(&survivors));
        if fewer.is_empty() {
            Assessment::Exhausted
        } else {
            Assessment::Refine(fewer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tol() -> Tolerances {
        Tolerances::default()
    }

    #[test]
    fn accepts_component_matching_parent() {
        let parent = components(&[1.0, 0.0, 1.0]);
        let c = Component { amplitude: 0.9, centroid: 0.3, sigma: 1.2 };
        assert_eq!(check_component(&c, &parent, 0.1, 0.5, &tol()), Ok(()));
    }

    #[test]
    fn rejects_each_tolerance() {
        let parent = components(&[1.0, 0.0, 1.0]);
        let t = tol();

        let weak = Component { amplitude: 0.2, centroid: 0.0, sigma: 1.0 };
        assert_eq!(check_component(&weak, &parent, 0.1, 0.5, &t), Err(Rejection::LowSnr));

        let narrow = Component { amplitude: 1.0, centroid: 0.0, sigma: 0.1 };
        assert_eq!(check_component(&narrow, &parent, 0.1, 0.5, &t), Err(Rejection::TooNarrow));

        let wide = Component { amplitude: 1.0, centroid: 0.0, sigma: 3.0 };
        assert_eq!(check_component(&wide, &parent, 0.1, 0.5, &t), Err(Rejection::WidthMismatch));

        let shifted = Component { amplitude: 1.0, centroid: 4.0, sigma: 1.0 };
        assert_eq!(check_component(&shifted, &parent, 0.1, 0.5, &t), Err(Rejection::VelocityShift));
    }

    #[test]
    fn merges_overlapping_components() {
        let comps = components(&[1.0, 0.0, 1.0, 1.0, 0.5, 1.0, 2.0, 10.0, 1.0]);
        let merged = merge_close(&comps, 0.5);
        assert_eq!(merged.len(), 2);
        assert!((merged[0].amplitude - 2.0).abs() < 1e-12);
        assert!((merged[0].centroid - 0.25).abs() < 1e-12);
        assert_eq!(merged[1].centroid, 10.0);
    }

    #[test]
    fn drop_weakest_removes_lowest_amplitude() {
        let fewer = drop_weakest(&[2.0, 0.0, 1.0, 0.5, 5.0, 1.0, 3.0, 9.0, 1.0]);
        assert_eq!(fewer, vec![2.0, 0.0, 1.0, 3.0, 9.0, 1.0]);
    }

    #[test]
    fn assessment_always_shrinks_or_stops() {
        let t = tol();
        let parent = [1.0, 0.0, 1.0, 1.0, 6.0, 1.0];

        assert_eq!(assess(&parent, &parent, 0.1, 0.5, &t, true), Assessment::Accept);

        // One spurious weak component is dropped.
        let fitted = [1.0, 0.0, 1.0, 1.0, 6.0, 1.0, 0.05, 3.0, 1.0];
        match assess(&fitted, &parent, 0.1, 0.5, &t, true) {
            Assessment::Refine(g) => assert_eq!(g.len(), 6),
            other => panic!("expected refinement, got {other:?}"),
        }

        // Clean but unconverged: weakest dropped.
        match assess(&parent, &parent, 0.1, 0.5, &t, false) {
            Assessment::Refine(g) => assert_eq!(g.len(), 3),
            other => panic!("expected refinement, got {other:?}"),
        }

        // Nothing survives.
        assert_eq!(assess(&[0.01, 0.0, 1.0], &parent, 0.1, 0.5, &t, true), Assessment::Exhausted);
    }

    #[test]
    fn component_count_delta_is_enforced() {
        let t = Tolerances {
            max_component_delta: 0,
            ..Tolerances::default()
        };
        let parent = [1.0, 0.0, 1.0, 1.0, 6.0, 1.0];
        assert_eq!(assess(&[1.0, 0.0, 1.0], &parent, 0.1, 0.5, &t, true), Assessment::Exhausted);
    }
}
