//! Progress notifications.
//!
//! Stages report milestones through a `ProgressSink`. Sinks only observe: they
//! receive events by reference and have no way to influence the pipeline.

use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    GenerationStarted { regions: usize },
    TaskGenerated { total: usize },
    GenerationFinished { tasks: usize },
    FittingStarted { tasks: usize, workers: usize },
    IterationFinished {
        iteration: usize,
        dispatched: usize,
        converged: usize,
        exhausted: usize,
        retry: usize,
    },
    CompilationStarted { tasks: usize },
    CompilationFinished { pixels: usize, multi_candidate: usize },
}

pub trait ProgressSink: Sync {
    fn notify(&self, event: &ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _event: &ProgressEvent) {}
}

/// Writes milestones to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::GenerationStarted { regions } => {
                info!(regions, "initialising individual spectra");
            }
            ProgressEvent::TaskGenerated { total } => {
                debug!(total, "spectrum task generated");
            }
            ProgressEvent::GenerationFinished { tasks } => {
                info!(tasks, "individual spectra ready for fitting");
            }
            ProgressEvent::FittingStarted { tasks, workers } => {
                info!(tasks, workers, "starting autonomous decomposition");
            }
            ProgressEvent::IterationFinished {
                iteration,
                dispatched,
                converged,
                exhausted,
                retry,
            } => {
                info!(iteration, dispatched, converged, exhausted, retry, "fit iteration complete");
            }
            ProgressEvent::CompilationStarted { tasks } => {
                info!(tasks, "compiling spectra");
            }
            ProgressEvent::CompilationFinished {
                pixels,
                multi_candidate,
            } => {
                info!(pixels, multi_candidate, "compilation complete");
            }
        }
    }
}
