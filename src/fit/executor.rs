//! Single-spectrum fit invocation.
//!
//! `decomposition_method` is a pure function of the task and the shared fit
//! context: it restricts the spectrum to the trimmed channels, chooses the
//! guesses for this attempt and hands everything to a `SpectrumFitter`.

use std::ops::Range;

use crate::domain::{DecompositionConfig, FitKind, FitResult, SpectralTemplate, SpectrumTask, Tolerances};
use crate::error::AppError;

/// Everything a fitting capability sees for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct FitProblem<'a> {
    /// Spectral axis (km/s), already trimmed.
    pub axis: &'a [f64],
    /// Flux values on `axis`.
    pub flux: &'a [f64],
    pub rms: f64,
    /// Guesses for this attempt.
    pub guesses: &'a [f64],
    /// The seeding region's parameters, for tolerance comparison.
    pub parent_guesses: &'a [f64],
    pub tol: &'a Tolerances,
    /// Channel spacing (km/s).
    pub resolution: f64,
    pub kind: FitKind,
}

/// Result of one attempt: a model, or refined guesses for another try.
///
/// `model == None` with empty `guesses_updated` means no further refinement is
/// possible.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub model: Option<FitResult>,
    pub guesses_updated: Vec<f64>,
}

impl FitOutcome {
    pub fn converged(model: FitResult, guesses: Vec<f64>) -> Self {
        Self {
            model: Some(model),
            guesses_updated: guesses,
        }
    }

    pub fn refine(guesses: Vec<f64>) -> Self {
        Self {
            model: None,
            guesses_updated: guesses,
        }
    }

    pub fn exhausted() -> Self {
        Self {
            model: None,
            guesses_updated: Vec::new(),
        }
    }
}

/// The fitting capability.
///
/// Implementations must not return a refined guess vector that is as long as
/// (or longer than) the guesses they were given, otherwise the retry loop has
/// no guarantee of terminating.
pub trait SpectrumFitter: Sync {
    fn fit(&self, problem: &FitProblem<'_>) -> Result<FitOutcome, AppError>;
}

/// Shared, read-only state for every fit in a decomposition run.
#[derive(Debug, Clone)]
pub struct FitContext<'a> {
    pub config: &'a DecompositionConfig,
    /// Channels of each pixel spectrum that line up with the template axis.
    pub trim: Range<usize>,
    /// Channel spacing (km/s).
    pub resolution: f64,
}

impl<'a> FitContext<'a> {
    pub fn new(config: &'a DecompositionConfig, trim: Range<usize>, template: &SpectralTemplate) -> Self {
        Self {
            config,
            trim,
            resolution: template.channel_spacing,
        }
    }
}

/// Fit one spectrum task.
///
/// Non-convergence is a normal outcome; errors are only raised for malformed
/// input.
pub fn decomposition_method<F: SpectrumFitter + ?Sized>(
    task: &SpectrumTask,
    ctx: &FitContext<'_>,
    fitter: &F,
) -> Result<FitOutcome, AppError> {
    let template = task.template.as_deref().ok_or_else(|| {
        AppError::internal(format!(
            "Spectrum {} was dispatched without a spectral template.",
            task.index
        ))
    })?;

    let axis = template.axis.as_slice();
    if axis.is_empty() {
        return Err(AppError::invalid_input("Spectral axis is empty."));
    }

    let flux = task.spectrum.get(ctx.trim.clone()).ok_or_else(|| {
        AppError::invalid_input(format!(
            "Spectrum {} has {} channels; trim window {:?} is out of range.",
            task.index,
            task.spectrum.len(),
            ctx.trim
        ))
    })?;
    if flux.len() != axis.len() {
        return Err(AppError::invalid_input(format!(
            "Spectrum {} has {} trimmed channels but the axis has {}.",
            task.index,
            flux.len(),
            axis.len()
        )));
    }
    if flux.iter().any(|v| !v.is_finite()) {
        return Err(AppError::invalid_input(format!(
            "Spectrum {} at (x={}, y={}) contains non-finite flux.",
            task.index, task.coordinates.x, task.coordinates.y
        )));
    }
    if !(task.rms.is_finite() && task.rms > 0.0) {
        return Err(AppError::invalid_input(format!(
            "Spectrum {} has an invalid noise estimate: {}.",
            task.index, task.rms
        )));
    }

    let problem = FitProblem {
        axis,
        flux,
        rms: task.rms,
        guesses: task.current_guesses(),
        parent_guesses: &task.guesses_from_parent,
        tol: &ctx.config.tol,
        resolution: ctx.resolution,
        kind: ctx.config.fit_kind,
    };

    fitter.fit(&problem)
}
