//! Shared domain types.
//!
//! These types are kept plain and serializable so they can be:
//!
//! - loaded from a run input file (regions and their seed models)
//! - mutated by the scheduler while a spectrum is being fit
//! - handed to reporting once the compiled mapping is final

use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Number of decimals used when comparing information criteria.
///
/// Two fits whose AIC agree after rounding to this precision are treated as
/// the same solution.
pub const AIC_DECIMALS: i32 = 2;

/// Line-shape family handed to the fitting capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FitKind {
    /// Sum of Gaussian components, `[amplitude, centroid, sigma]` each.
    Gaussian,
}

impl FitKind {
    pub fn display_name(self) -> &'static str {
        match self {
            FitKind::Gaussian => "gaussian",
        }
    }

    /// Number of free parameters per component.
    pub fn params_per_component(self) -> usize {
        match self {
            FitKind::Gaussian => 3,
        }
    }

    /// Number of whole components described by a flat parameter vector.
    pub fn component_count(self, params: &[f64]) -> usize {
        params.len() / self.params_per_component()
    }
}

/// Spatial pixel coordinate (`x` = column, `y` = row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: usize,
    pub y: usize,
}

/// Which region (at which scale) seeded a candidate fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Position of the region container (one spatial scale) in the hierarchy.
    pub container: usize,
    /// Index of the averaging region within that container.
    pub region: usize,
}

/// A converged parameter set for one spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub kind: FitKind,
    pub ncomps: usize,
    pub params: Vec<f64>,
    pub errors: Vec<f64>,
    pub aic: f64,
    #[serde(default)]
    pub chisq: f64,
    #[serde(default)]
    pub redchisq: f64,
    /// Noise estimate the fit was weighted with.
    #[serde(default)]
    pub rms: f64,
    /// RMS of the data minus the model over the fitted channels.
    #[serde(default)]
    pub residual_rms: f64,
}

impl FitResult {
    /// AIC rounded to [`AIC_DECIMALS`], as a comparison key.
    ///
    /// Returns `None` for a non-finite AIC.
    pub fn aic_key(&self) -> Option<f64> {
        round_aic(self.aic)
    }

    pub fn component(&self, i: usize) -> Option<&[f64]> {
        let n = self.kind.params_per_component();
        self.params.get(i * n..(i + 1) * n)
    }
}

/// Scale an AIC value by `10^AIC_DECIMALS` and round it (ties to even).
///
/// The key stays a float so that values of any magnitude keep distinct keys;
/// two keys are equal when their bits are. `None` when the AIC or its scaled
/// value is not finite.
pub fn round_aic(aic: f64) -> Option<f64> {
    let scaled = aic * 10f64.powi(AIC_DECIMALS);
    if !scaled.is_finite() {
        return None;
    }
    // Folds -0.0 into 0.0.
    Some(scaled.round_ties_even() + 0.0)
}

/// One spectral averaging area (SAA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragingRegion {
    pub index: usize,
    /// Member pixels as `[row, col]` (i.e. `[y, x]`) pairs.
    pub indices: Vec<[usize; 2]>,
    /// Whether member pixels should be fit individually.
    pub to_be_fit: bool,
    #[serde(default)]
    model: Option<FitResult>,
}

impl AveragingRegion {
    pub fn new(index: usize, indices: Vec<[usize; 2]>, to_be_fit: bool) -> Self {
        Self {
            index,
            indices,
            to_be_fit,
            model: None,
        }
    }

    pub fn model(&self) -> Option<&FitResult> {
        self.model.as_ref()
    }

    /// Attach the region's own fitted model. A region is only ever fit once.
    pub fn set_model(&mut self, model: FitResult) -> Result<(), AppError> {
        if self.model.is_some() {
            return Err(AppError::invalid_input(format!(
                "Averaging region {} already carries a model.",
                self.index
            )));
        }
        self.model = Some(model);
        Ok(())
    }

    /// Row-major flat pixel indices over a `(ny, nx)` spatial shape.
    pub fn indices_flat(&self, spatial: (usize, usize)) -> Result<Vec<usize>, AppError> {
        self.indices
            .iter()
            .map(|&[row, col]| ravel_index(row, col, spatial))
            .collect()
    }

    pub fn coordinates(&self) -> impl Iterator<Item = PixelCoord> + '_ {
        self.indices.iter().map(|&[row, col]| PixelCoord { x: col, y: row })
    }
}

/// All averaging regions built at one spatial scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionContainer {
    /// Region width in pixels.
    pub width: usize,
    pub regions: Vec<AveragingRegion>,
}

/// Row-major flat index of `(row, col)` in a `(ny, nx)` grid.
pub fn ravel_index(row: usize, col: usize, spatial: (usize, usize)) -> Result<usize, AppError> {
    let (ny, nx) = spatial;
    if row >= ny || col >= nx {
        return Err(AppError::invalid_input(format!(
            "Pixel (row={row}, col={col}) lies outside the {ny}x{nx} spatial grid."
        )));
    }
    Ok(row * nx + col)
}

/// Spectral axis units understood by the template builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectralUnit {
    #[serde(rename = "km/s")]
    KmPerS,
    #[serde(rename = "m/s")]
    MPerS,
}

impl SpectralUnit {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "km/s" | "km s-1" | "kms-1" | "km.s-1" => Some(SpectralUnit::KmPerS),
            "m/s" | "m s-1" | "ms-1" | "m.s-1" => Some(SpectralUnit::MPerS),
            _ => None,
        }
    }

    /// Multiplicative factor converting this unit into km/s.
    pub fn to_kms(self) -> f64 {
        match self {
            SpectralUnit::KmPerS => 1.0,
            SpectralUnit::MPerS => 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityConvention {
    Radio,
}

/// Reusable spectral-axis definition shared by every fit invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralTemplate {
    /// Trimmed spectral axis in km/s.
    pub axis: Vec<f64>,
    /// Unit the axis was supplied in (the stored axis is always km/s).
    pub source_unit: SpectralUnit,
    pub convention: VelocityConvention,
    pub rest_frequency_hz: f64,
    pub flux_unit: Option<String>,
    /// Channel spacing in km/s (signed, follows the axis direction).
    pub channel_spacing: f64,
}

/// Retry-loop state of one spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Dispatched,
    Converged,
    Retry,
    Exhausted,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Converged | TaskState::Exhausted)
    }
}

/// One pixel's fitting state, seeded by one averaging region.
#[derive(Debug, Clone)]
pub struct SpectrumTask {
    pub index: usize,
    pub coordinates: PixelCoord,
    /// Full (untrimmed) spectrum of the pixel.
    pub spectrum: Vec<f64>,
    pub rms: f64,
    pub provenance: Provenance,
    pub guesses_from_parent: Vec<f64>,
    pub guesses_updated: Option<Vec<f64>>,
    pub template: Option<Arc<SpectralTemplate>>,
    pub model: Option<FitResult>,
    pub state: TaskState,
}

impl SpectrumTask {
    /// Guesses for the next attempt: refined guesses when they hold more than
    /// one value, otherwise the parent region's parameters.
    pub fn current_guesses(&self) -> &[f64] {
        match &self.guesses_updated {
            Some(g) if g.len() > 1 => g,
            _ => &self.guesses_from_parent,
        }
    }

    pub fn mark_dispatched(&mut self) {
        self.state = TaskState::Dispatched;
    }

    pub fn converge(&mut self, model: FitResult) {
        self.model = Some(model);
        self.state = TaskState::Converged;
        self.template = None;
    }

    pub fn exhaust(&mut self) {
        self.model = None;
        self.state = TaskState::Exhausted;
        self.template = None;
    }

    /// Store refined guesses and send the task back for another attempt.
    pub fn retry(&mut self, guesses: Vec<f64>) {
        self.guesses_updated = Some(guesses);
        self.state = TaskState::Retry;
    }

    pub fn requeue(&mut self) {
        self.state = TaskState::Pending;
    }
}

/// The canonical per-pixel result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledSpectrum {
    pub index: usize,
    pub coordinates: PixelCoord,
    pub rms: f64,
    pub model: Option<FitResult>,
    /// Contributing regions, index-aligned with `candidates`.
    pub provenance: Vec<Provenance>,
    pub candidates: Vec<Option<FitResult>>,
}

impl CompiledSpectrum {
    /// Number of distinct converged solutions retained for this pixel.
    pub fn solution_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.is_some()).count()
    }
}

/// Parent-comparison tolerances used by the fitting capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Largest permitted change in component count relative to the parent.
    pub max_component_delta: usize,
    /// Minimum peak signal-to-noise of a component.
    pub snr_min: f64,
    /// Minimum FWHM of a component, in channels.
    pub min_width_channels: f64,
    /// Child/parent sigma must lie in `[1/width_ratio, width_ratio]`.
    pub width_ratio: f64,
    /// Maximum centroid shift from the nearest parent component, in parent sigmas.
    pub velocity_shift: f64,
    /// Components closer than this fraction of the narrower FWHM are merged.
    pub min_separation: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            max_component_delta: 2,
            snr_min: 3.0,
            min_width_channels: 1.0,
            width_ratio: 2.5,
            velocity_shift: 2.5,
            min_separation: 0.5,
        }
    }
}

/// Spectral window (km/s) the fits are restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub vmin: f64,
    pub vmax: f64,
}

/// A full run's configuration as understood by the pipeline.
///
/// Built once from CLI flags and passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct DecompositionConfig {
    pub tol: Tolerances,
    pub fit_kind: FitKind,
    /// Worker count for batch dispatch (`1` = strictly serial).
    pub njobs: usize,
    /// Noise level used when a spectrum's own rms cannot be estimated.
    pub rms_approx: f64,
    /// Ceiling on retry iterations.
    pub max_iterations: usize,
    pub trim: Option<TrimWindow>,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            tol: Tolerances::default(),
            fit_kind: FitKind::Gaussian,
            njobs: 1,
            rms_approx: 0.1,
            max_iterations: 100,
            trim: None,
        }
    }
}

impl DecompositionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let tol = &self.tol;
        if !(tol.snr_min.is_finite() && tol.snr_min >= 0.0) {
            return Err(AppError::invalid_input("Invalid snr_min tolerance."));
        }
        if !(tol.min_width_channels.is_finite() && tol.min_width_channels >= 0.0) {
            return Err(AppError::invalid_input("Invalid min_width_channels tolerance."));
        }
        if !(tol.width_ratio.is_finite() && tol.width_ratio >= 1.0) {
            return Err(AppError::invalid_input("width_ratio tolerance must be >= 1."));
        }
        if !(tol.velocity_shift.is_finite() && tol.velocity_shift > 0.0) {
            return Err(AppError::invalid_input("velocity_shift tolerance must be > 0."));
        }
        if !(tol.min_separation.is_finite() && tol.min_separation >= 0.0) {
            return Err(AppError::invalid_input("Invalid min_separation tolerance."));
        }
        if self.njobs == 0 {
            return Err(AppError::invalid_input("njobs must be >= 1."));
        }
        if !(self.rms_approx.is_finite() && self.rms_approx > 0.0) {
            return Err(AppError::invalid_input("rms_approx must be finite and > 0."));
        }
        if self.max_iterations == 0 {
            return Err(AppError::invalid_input("max_iterations must be >= 1."));
        }
        if let Some(w) = self.trim {
            if !(w.vmin.is_finite() && w.vmax.is_finite() && w.vmax > w.vmin) {
                return Err(AppError::invalid_input(format!(
                    "Invalid spectral window: vmin={}, vmax={}.",
                    w.vmin, w.vmax
                )));
            }
        }
        Ok(())
    }
}
