//! Spectral template construction.
//!
//! Every fit works on the same trimmed velocity axis. Building it once, up
//! front, and sharing it behind an `Arc` keeps per-task construction out of the
//! parallel fitting loop.

use crate::cube::{CubeMeta, CubeSource};
use crate::domain::{SpectralTemplate, SpectralUnit, VelocityConvention};
use crate::error::AppError;

/// Build the template from cube metadata and the trimmed spectral axis.
///
/// Fails if the rest frequency or spectral unit is missing, or if the axis is
/// empty or non-finite.
pub fn build_template(
    meta: &CubeMeta,
    trimmed_axis: &[f64],
    channel_spacing: f64,
) -> Result<SpectralTemplate, AppError> {
    let rest_frequency_hz = match meta.rest_frequency_hz {
        Some(f) if f.is_finite() && f > 0.0 => f,
        Some(f) => {
            return Err(AppError::invalid_input(format!(
                "Invalid rest frequency in cube metadata: {f}."
            )));
        }
        None => {
            return Err(AppError::invalid_input(
                "Cube metadata has no rest frequency; cannot build the spectral template.",
            ));
        }
    };

    let unit_label = meta.spectral_unit.as_deref().ok_or_else(|| {
        AppError::invalid_input("Cube metadata has no spectral unit; cannot build the spectral template.")
    })?;
    let source_unit = SpectralUnit::parse(unit_label).ok_or_else(|| {
        AppError::invalid_input(format!("Unsupported spectral unit '{unit_label}'."))
    })?;

    if trimmed_axis.is_empty() {
        return Err(AppError::invalid_input("Trimmed spectral axis is empty."));
    }
    if trimmed_axis.iter().any(|v| !v.is_finite()) {
        return Err(AppError::invalid_input("Trimmed spectral axis contains non-finite values."));
    }
    if !(channel_spacing.is_finite() && channel_spacing != 0.0) {
        return Err(AppError::invalid_input(format!(
            "Invalid channel spacing: {channel_spacing}."
        )));
    }

    let to_kms = source_unit.to_kms();
    Ok(SpectralTemplate {
        axis: trimmed_axis.iter().map(|v| v * to_kms).collect(),
        source_unit,
        convention: VelocityConvention::Radio,
        rest_frequency_hz,
        flux_unit: meta.bunit.clone(),
        channel_spacing: channel_spacing * to_kms,
    })
}

/// Convenience wrapper reading everything from a cube source.
pub fn gen_template<C: CubeSource + ?Sized>(cube: &C) -> Result<SpectralTemplate, AppError> {
    build_template(cube.meta(), cube.trimmed_axis(), cube.channel_spacing())
}
