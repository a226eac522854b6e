//! Shared decomposition pipeline used by every front-end command.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! template -> task generation -> retry loop -> compilation
//!
//! The commands can then focus on where the cube comes from and on printing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cube::{CubeSource, DataCube};
use crate::domain::{CompiledSpectrum, DecompositionConfig, RegionContainer, SpectralTemplate};
use crate::error::AppError;
use crate::fit::{
    Decomposition, Dispatcher, FitContext, SpectrumFitter, autonomous_decomposition, compile_spectra,
    gen_template, initialise_fitting,
};
use crate::report::{DecompositionStats, ProgressSink};

/// All computed outputs of a single decomposition run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub template: SpectralTemplate,
    pub decomposition: Decomposition,
    /// One entry per pixel index that received at least one task.
    pub compiled: BTreeMap<usize, CompiledSpectrum>,
    pub stats: DecompositionStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutput {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Apply the configured velocity window to the cube.
pub fn prepare_cube(cube: &mut DataCube, config: &DecompositionConfig) -> Result<(), AppError> {
    if let Some(window) = config.trim {
        cube.set_trim(window)?;
    }
    Ok(())
}

/// Execute the full decomposition pipeline and return the computed outputs.
pub fn run_decomposition<C, F>(
    cube: &C,
    hierarchy: &[RegionContainer],
    config: &DecompositionConfig,
    fitter: &F,
    progress: &dyn ProgressSink,
) -> Result<RunOutput, AppError>
where
    C: CubeSource + ?Sized,
    F: SpectrumFitter + ?Sized,
{
    config.validate()?;
    let started_at = Utc::now();

    // 1) One template shared by every task.
    let template = Arc::new(gen_template(cube)?);
    let npc = config.fit_kind.params_per_component();
    if template.axis.len() < npc {
        return Err(AppError::insufficient_data(format!(
            "Only {} channels fall in the fitted window; one {} component needs {npc}.",
            template.axis.len(),
            config.fit_kind.display_name()
        )));
    }

    // 2) One task per (pixel, region) pair.
    let tasks = initialise_fitting(cube, hierarchy, Arc::clone(&template), config, progress)?;
    if tasks.is_empty() {
        warn!("no averaging region is flagged for fitting; nothing to decompose");
    }

    // 3) Retry loop.
    let dispatcher = Dispatcher::new(config.njobs)?;
    let ctx = FitContext::new(config, cube.trim_ids(), &template);
    let decomposition = autonomous_decomposition(tasks, &ctx, fitter, &dispatcher, progress)?;

    // 4) One result per pixel.
    let compiled = compile_spectra(&decomposition.completed, progress);
    let stats = DecompositionStats::from_run(&decomposition, &compiled);

    let finished_at = Utc::now();
    info!(
        pixels = stats.pixels,
        converged = stats.converged,
        elapsed_ms = (finished_at - started_at).num_milliseconds(),
        "decomposition finished"
    );

    Ok(RunOutput {
        template: SpectralTemplate::clone(&template),
        decomposition,
        compiled,
        stats,
        started_at,
        finished_at,
    })
}
