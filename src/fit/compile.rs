//! Compilation of candidate fits into one result per pixel.
//!
//! With overlapping averaging regions a pixel can finish the retry loop more
//! than once. Candidates are grouped by pixel index and collapsed:
//!
//! - one candidate: adopted as-is
//! - several, none converged: the first is the representative and every
//!   candidate's provenance is kept
//! - several, some converged: converged candidates whose AIC agrees to two
//!   decimals are the same solution; the first of each distinct value is
//!   kept (in completion order) and the first kept one is the representative
//!
//! The representative is chosen by position, not by lowest AIC.

use std::collections::BTreeMap;

use crate::domain::{CompiledSpectrum, SpectrumTask};
use crate::report::{ProgressEvent, ProgressSink};

/// Collapse the completed task list into `{pixel index -> CompiledSpectrum}`.
pub fn compile_spectra(
    completed: &[SpectrumTask],
    progress: &dyn ProgressSink,
) -> BTreeMap<usize, CompiledSpectrum> {
    progress.notify(&ProgressEvent::CompilationStarted {
        tasks: completed.len(),
    });

    let mut groups: BTreeMap<usize, Vec<&SpectrumTask>> = BTreeMap::new();
    for task in completed {
        groups.entry(task.index).or_default().push(task);
    }

    let multi_candidate = groups.values().filter(|g| g.len() > 1).count();
    let compiled: BTreeMap<usize, CompiledSpectrum> = groups
        .into_iter()
        .map(|(index, candidates)| (index, compilation_method(&candidates)))
        .collect();

    progress.notify(&ProgressEvent::CompilationFinished {
        pixels: compiled.len(),
        multi_candidate,
    });
    compiled
}

/// Compile all candidates for one pixel. `candidates` must be non-empty and
/// share one index.
fn compilation_method(candidates: &[&SpectrumTask]) -> CompiledSpectrum {
    let retained: Vec<&SpectrumTask> = if candidates.len() == 1 {
        candidates.to_vec()
    } else {
        let mut seen: Vec<f64> = Vec::new();
        let mut unique = Vec::new();
        for &task in candidates {
            let Some(key) = task.model.as_ref().and_then(|m| m.aic_key()) else {
                continue;
            };
            if !seen.iter().any(|k| k.to_bits() == key.to_bits()) {
                seen.push(key);
                unique.push(task);
            }
        }
        if unique.is_empty() {
            candidates.to_vec()
        } else {
            unique
        }
    };

    let representative = retained[0];
    CompiledSpectrum {
        index: representative.index,
        coordinates: representative.coordinates,
        rms: representative.rms,
        model: representative.model.clone(),
        provenance: retained.iter().map(|t| t.provenance).collect(),
        candidates: retained.iter().map(|t| t.model.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::{FitKind, FitResult, PixelCoord, Provenance, TaskState};
    use crate::report::NoProgress;
    use crate::report::progress::testing::RecordingProgress;

    fn model(aic: f64, amp: f64) -> FitResult {
        FitResult {
            kind: FitKind::Gaussian,
            ncomps: 1,
            params: vec![amp, 0.0, 1.0],
            errors: vec![0.01; 3],
            aic,
            chisq: aic - 6.0,
            redchisq: 1.0,
            rms: 0.1,
            residual_rms: 0.1,
        }
    }

    fn done(index: usize, container: usize, region: usize, model: Option<FitResult>) -> SpectrumTask {
        let state = if model.is_some() {
            TaskState::Converged
        } else {
            TaskState::Exhausted
        };
        SpectrumTask {
            index,
            coordinates: PixelCoord { x: index % 10, y: index / 10 },
            spectrum: vec![0.0; 4],
            rms: 0.1,
            provenance: Provenance { container, region },
            guesses_from_parent: vec![1.0, 0.0, 1.0],
            guesses_updated: None,
            template: None,
            model,
            state,
        }
    }

    #[test]
    fn single_candidate_is_adopted() {
        let completed = vec![done(3, 0, 7, Some(model(12.0, 1.0))), done(4, 0, 7, None)];
        let out = compile_spectra(&completed, &NoProgress);

        assert_eq!(out[&3].provenance, vec![Provenance { container: 0, region: 7 }]);
        assert_eq!(out[&3].model.as_ref().map(|m| m.aic), Some(12.0));
        assert_eq!(out[&4].model, None);
        assert_eq!(out[&4].candidates, vec![None]);
    }

    #[test]
    fn rounded_aic_tie_collapses_to_one() {
        let completed = vec![
            done(1, 0, 0, Some(model(12.341, 1.0))),
            done(1, 1, 4, Some(model(12.338, 2.0))),
        ];
        let out = compile_spectra(&completed, &NoProgress);
        let p = &out[&1];
        assert_eq!(p.provenance.len(), 1);
        assert_eq!(p.provenance[0], Provenance { container: 0, region: 0 });
        assert_eq!(p.model.as_ref().map(|m| m.params[0]), Some(1.0));
    }

    #[test]
    fn distinct_aic_keeps_both() {
        let completed = vec![
            done(1, 0, 0, Some(model(12.34, 1.0))),
            done(1, 1, 4, Some(model(12.30, 2.0))),
        ];
        let out = compile_spectra(&completed, &NoProgress);
        let p = &out[&1];
        assert_eq!(p.provenance.len(), 2);
        assert_eq!(p.candidates.len(), 2);
        assert_eq!(p.solution_count(), 2);
    }

    #[test]
    fn very_large_distinct_aic_keeps_both() {
        let completed = vec![
            done(6, 0, 0, Some(model(1.0e19, 1.0))),
            done(6, 1, 3, Some(model(5.0e19, 2.0))),
        ];
        let out = compile_spectra(&completed, &NoProgress);
        let p = &out[&6];
        assert_eq!(p.provenance, vec![
            Provenance { container: 0, region: 0 },
            Provenance { container: 1, region: 3 },
        ]);
        assert_eq!(p.solution_count(), 2);
        assert_eq!(p.model.as_ref().map(|m| m.aic), Some(1.0e19));
    }

    #[test]
    fn first_candidate_wins_over_lower_aic() {
        // Pixel P seeded by a coarse and a fine region.
        let completed = vec![
            done(0, 0, 0, Some(model(30.0, 1.0))),
            done(5, 0, 0, Some(model(50.00, 1.0))),
            done(9, 0, 0, Some(model(31.0, 1.0))),
            done(5, 1, 2, Some(model(45.12, 3.0))),
        ];
        let out = compile_spectra(&completed, &NoProgress);
        let p = &out[&5];
        assert_eq!(p.provenance, vec![
            Provenance { container: 0, region: 0 },
            Provenance { container: 1, region: 2 },
        ]);
        assert_eq!(p.model.as_ref().map(|m| m.aic), Some(50.0));
        assert_eq!(p.candidates[1].as_ref().map(|m| m.aic), Some(45.12));
    }

    #[test]
    fn equal_aic_scenario_has_single_provenance() {
        let completed = vec![
            done(5, 0, 0, Some(model(45.12, 1.0))),
            done(5, 1, 2, Some(model(45.12, 3.0))),
        ];
        let out = compile_spectra(&completed, &NoProgress);
        assert_eq!(out[&5].provenance.len(), 1);
        assert!(out[&5].model.is_some());
    }

    #[test]
    fn all_null_candidates_record_every_provenance() {
        let completed = vec![done(8, 0, 1, None), done(8, 2, 6, None)];
        let out = compile_spectra(&completed, &NoProgress);
        let q = &out[&8];
        assert!(q.model.is_none());
        assert_eq!(q.provenance, vec![
            Provenance { container: 0, region: 1 },
            Provenance { container: 2, region: 6 },
        ]);
        assert_eq!(q.candidates, vec![None, None]);
    }

    #[test]
    fn null_candidates_are_dropped_when_a_model_exists() {
        let completed = vec![
            done(2, 0, 0, None),
            done(2, 1, 1, Some(model(20.0, 1.0))),
            done(2, 2, 2, None),
        ];
        let out = compile_spectra(&completed, &NoProgress);
        let p = &out[&2];
        assert_eq!(p.provenance, vec![Provenance { container: 1, region: 1 }]);
        assert_eq!(p.model.as_ref().map(|m| m.aic), Some(20.0));
    }

    #[test]
    fn covers_every_index_exactly_once_and_is_idempotent() {
        let completed: Vec<SpectrumTask> = (0..50)
            .map(|i| {
                let idx = i % 17;
                let m = if i % 4 == 0 { None } else { Some(model(10.0 + (i % 3) as f64, 1.0)) };
                done(idx, i % 3, i, m)
            })
            .collect();

        let first = compile_spectra(&completed, &NoProgress);
        let second = compile_spectra(&completed, &NoProgress);
        assert_eq!(first, second);

        let expected: BTreeSet<usize> = completed.iter().map(|t| t.index).collect();
        let keys: BTreeSet<usize> = first.keys().copied().collect();
        assert_eq!(keys, expected);
        for (k, v) in &first {
            assert_eq!(*k, v.index);
            assert_eq!(v.provenance.len(), v.candidates.len());
            if let Some(m) = &v.model {
                assert!(v.candidates.iter().flatten().any(|c| c == m));
            }
        }
    }

    #[test]
    fn reports_multi_candidate_pixels() {
        let completed = vec![done(1, 0, 0, None), done(1, 1, 1, None), done(2, 0, 0, None)];
        let progress = RecordingProgress::default();
        compile_spectra(&completed, &progress);
        assert_eq!(
            progress.take().last(),
            Some(&ProgressEvent::CompilationFinished { pixels: 2, multi_candidate: 1 })
        );
    }
}
