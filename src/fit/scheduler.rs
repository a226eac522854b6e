//! Autonomous decomposition: the per-spectrum retry loop.
//!
//! Tasks live in exactly one of two queues. Each iteration takes the whole
//! pending queue, dispatches it as one batch, and sorts every task by outcome:
//!
//! - model returned: `Converged`, moved to the completed queue
//! - no model, no refined guesses: `Exhausted`, moved to the completed queue
//! - no model, refined guesses: `Retry`, stored and re-queued as `Pending`
//!
//! The loop ends when nothing is pending. Terminal tasks drop their template
//! handle as they leave the batch.

use tracing::{debug, warn};

use crate::domain::{SpectrumTask, TaskState};
use crate::error::AppError;
use crate::fit::dispatch::Dispatcher;
use crate::fit::executor::{FitContext, FitOutcome, SpectrumFitter, decomposition_method};
use crate::report::{ProgressEvent, ProgressSink};

/// Outcome counts of one dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterationStats {
    pub iteration: usize,
    pub dispatched: usize,
    pub converged: usize,
    pub exhausted: usize,
    pub retry: usize,
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Terminal tasks, in the order they completed.
    pub completed: Vec<SpectrumTask>,
    pub iterations: Vec<IterationStats>,
    /// Tasks forced to `Exhausted` by the iteration ceiling.
    pub abandoned: usize,
}

/// Run the retry loop until every task is terminal.
pub fn autonomous_decomposition<F: SpectrumFitter + ?Sized>(
    tasks: Vec<SpectrumTask>,
    ctx: &FitContext<'_>,
    fitter: &F,
    dispatcher: &Dispatcher,
    progress: &dyn ProgressSink,
) -> Result<Decomposition, AppError> {
    progress.notify(&ProgressEvent::FittingStarted {
        tasks: tasks.len(),
        workers: dispatcher.workers(),
    });

    let mut pending = tasks;
    let mut completed = Vec::with_capacity(pending.len());
    let mut iterations = Vec::new();
    let mut abandoned = 0;

    while !pending.is_empty() {
        if iterations.len() >= ctx.config.max_iterations {
            warn!(
                remaining = pending.len(),
                max_iterations = ctx.config.max_iterations,
                "iteration ceiling reached; marking remaining spectra as exhausted"
            );
            abandoned = pending.len();
            for mut task in pending.drain(..) {
                task.exhaust();
                completed.push(task);
            }
            break;
        }

        for task in pending.iter_mut() {
            task.mark_dispatched();
        }

        let results = dispatcher.map(&pending, |task| decomposition_method(task, ctx, fitter));
        let results: Vec<FitOutcome> = results.into_iter().collect::<Result<_, _>>()?;

        let mut stats = IterationStats {
            iteration: iterations.len() + 1,
            dispatched: pending.len(),
            ..IterationStats::default()
        };
        let mut next = Vec::new();

        for (mut task, outcome) in pending.into_iter().zip(results) {
            match outcome.model {
                Some(model) => {
                    task.converge(model);
                    stats.converged += 1;
                    completed.push(task);
                }
                None if outcome.guesses_updated.is_empty() => {
                    task.exhaust();
                    stats.exhausted += 1;
                    completed.push(task);
                }
                None => {
                    if outcome.guesses_updated.len() >= task.current_guesses().len() {
                        debug!(
                            index = task.index,
                            before = task.current_guesses().len(),
                            after = outcome.guesses_updated.len(),
                            "refined guesses did not shrink"
                        );
                    }
                    task.retry(outcome.guesses_updated);
                    task.requeue();
                    stats.retry += 1;
                    next.push(task);
                }
            }
        }

        progress.notify(&ProgressEvent::IterationFinished {
            iteration: stats.iteration,
            dispatched: stats.dispatched,
            converged: stats.converged,
            exhausted: stats.exhausted,
            retry: stats.retry,
        });
        iterations.push(stats);
        pending = next;
    }

    debug_assert!(completed.iter().all(|t| t.state.is_terminal() && t.template.is_none()));
    debug_assert!(
        completed
            .iter()
            .all(|t| (t.state == TaskState::Converged) == t.model.is_some())
    );

    Ok(Decomposition {
        completed,
        iterations,
        abandoned,
    })
}
