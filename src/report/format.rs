//! Run statistics and formatted terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation
//! concerns and output changes stay local.

use std::collections::BTreeMap;

use crate::domain::{CompiledSpectrum, DecompositionConfig, SpectralTemplate};
use crate::fit::scheduler::{Decomposition, IterationStats};

/// Headline counts for one decomposition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecompositionStats {
    pub tasks: usize,
    pub iterations: usize,
    pub converged: usize,
    pub exhausted: usize,
    /// Tasks exhausted by the iteration ceiling rather than by the fitter.
    pub abandoned: usize,
    pub pixels: usize,
    /// Pixels that received more than one candidate.
    pub multi_candidate: usize,
    /// Pixels that kept at least two distinct solutions.
    pub multi_solution: usize,
    /// Pixels without any model.
    pub null_pixels: usize,
}

impl DecompositionStats {
    pub fn from_run(decomposition: &Decomposition, compiled: &BTreeMap<usize, CompiledSpectrum>) -> Self {
        let converged = decomposition.completed.iter().filter(|t| t.model.is_some()).count();
        let mut candidates: BTreeMap<usize, usize> = BTreeMap::new();
        for task in &decomposition.completed {
            *candidates.entry(task.index).or_default() += 1;
        }

        Self {
            tasks: decomposition.completed.len(),
            iterations: decomposition.iterations.len(),
            converged,
            exhausted: decomposition.completed.len() - converged,
            abandoned: decomposition.abandoned,
            pixels: compiled.len(),
            multi_candidate: candidates.values().filter(|n| **n > 1).count(),
            multi_solution: compiled.values().filter(|s| s.solution_count() > 1).count(),
            null_pixels: compiled.values().filter(|s| s.model.is_none()).count(),
        }
    }
}

/// Format the run header, configuration and headline counts.
pub fn format_run_summary(
    source: &str,
    template: &SpectralTemplate,
    config: &DecompositionConfig,
    stats: &DecompositionStats,
    elapsed: chrono::Duration,
) -> String {
    let mut out = String::new();

    out.push_str("=== scouse - autonomous decomposition ===\n");
    out.push_str(&format!("Input: {source}\n"));
    out.push_str(&format!(
        "Template: {} channels | v=[{:.3}, {:.3}] km/s | dv={:.4} km/s | rest={:.6e} Hz\n",
        template.axis.len(),
        template.axis.first().copied().unwrap_or(f64::NAN),
        template.axis.last().copied().unwrap_or(f64::NAN),
        template.channel_spacing,
        template.rest_frequency_hz,
    ));
    if let Some(unit) = &template.flux_unit {
        out.push_str(&format!("Flux unit: {unit}\n"));
    }
    out.push_str(&format!(
        "Model: {} | njobs={} | rms_approx={} | max_iterations={}\n",
        config.fit_kind.display_name(),
        config.njobs,
        config.rms_approx,
        config.max_iterations,
    ));
    let tol = &config.tol;
    out.push_str(&format!(
        "Tolerances: dN={} snr={} width={} ratio={} shift={} sep={}\n",
        tol.max_component_delta,
        tol.snr_min,
        tol.min_width_channels,
        tol.width_ratio,
        tol.velocity_shift,
        tol.min_separation,
    ));

    out.push_str("\nDecomposition:\n");
    out.push_str(&format!(
        "- tasks={} iterations={} converged={} exhausted={}\n",
        stats.tasks, stats.iterations, stats.converged, stats.exhausted
    ));
    if stats.abandoned > 0 {
        out.push_str(&format!("- abandoned at iteration ceiling: {}\n", stats.abandoned));
    }
    out.push_str(&format!(
        "- pixels={} multi_candidate={} multi_solution={} without_model={}\n",
        stats.pixels, stats.multi_candidate, stats.multi_solution, stats.null_pixels
    ));
    out.push_str(&format!("- elapsed: {:.3}s\n", elapsed.num_milliseconds() as f64 / 1000.0));

    out
}

/// Per-iteration batch outcomes.
pub fn format_iterations(iterations: &[IterationStats]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!("{:>5} {:>10} {:>10} {:>10} {:>8}", "iter", "dispatched", "converged", "exhausted", "retry"),
    );
    push_line(&mut out, format!("{:-<5} {:-<10} {:-<10} {:-<10} {:-<8}", "", "", "", "", ""));
    for it in iterations {
        push_line(
            &mut out,
            format!(
                "{:>5} {:>10} {:>10} {:>10} {:>8}",
                it.iteration, it.dispatched, it.converged, it.exhausted, it.retry
            ),
        );
    }
    out
}

/// Table of the first `top` compiled pixels (by index).
pub fn format_pixel_table(compiled: &BTreeMap<usize, CompiledSpectrum>, top: usize) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:>7} {:>5} {:>5} {:>9} {:>6} {:>10} {:>4} {:<24}",
            "index", "x", "y", "rms", "ncomp", "aic", "nsol", "provenance"
        ),
    );
    push_line(
        &mut out,
        format!("{:-<7} {:-<5} {:-<5} {:-<9} {:-<6} {:-<10} {:-<4} {:-<24}", "", "", "", "", "", "", "", ""),
    );

    for spec in compiled.values().take(top) {
        let (ncomp, aic) = match &spec.model {
            Some(m) => (m.ncomps.to_string(), format!("{:.2}", m.aic)),
            None => ("-".to_string(), "-".to_string()),
        };
        let provenance: Vec<String> = spec
            .provenance
            .iter()
            .map(|p| format!("{}/{}", p.container, p.region))
            .collect();
        push_line(
            &mut out,
            format!(
                "{:>7} {:>5} {:>5} {:>9.4} {:>6} {:>10} {:>4} {:<24}",
                spec.index,
                spec.coordinates.x,
                spec.coordinates.y,
                spec.rms,
                ncomp,
                aic,
                spec.solution_count(),
                truncate(&provenance.join(","), 24),
            ),
        );
    }
    if compiled.len() > top {
        out.push_str(&format!("... {} more pixels\n", compiled.len() - top));
    }
    out
}

/// Full parameter listing for one compiled pixel.
pub fn format_pixel_detail(spec: &CompiledSpectrum) -> String {
    let mut out = format!(
        "Pixel {} (x={}, y={}) rms={:.4}\n",
        spec.index, spec.coordinates.x, spec.coordinates.y, spec.rms
    );
    for (i, candidate) in spec.candidates.iter().enumerate() {
        let mark = if i == 0 { "*" } else { " " };
        let Some(m) = candidate else {
            out.push_str(&format!("{mark} no model\n"));
            continue;
        };
        out.push_str(&format!("{mark} aic={:.2} ncomps={} redchisq={:.3}\n", m.aic, m.ncomps, m.redchisq));
        let npc = m.kind.params_per_component();
        for c in 0..m.ncomps {
            let (Some(params), Some(errors)) = (m.component(c), m.errors.get(c * npc..(c + 1) * npc)) else {
                break;
            };
            out.push_str(&format!("    #{c} params={} errors={}\n", fmt_vec(params), fmt_vec(errors)));
        }
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.4}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitKind, FitResult, PixelCoord, Provenance, SpectrumTask, TaskState};
    use crate::fit::compile::compile_spectra;
    use crate::report::NoProgress;

    fn done(index: usize, region: usize, aic: Option<f64>) -> SpectrumTask {
        let model = aic.map(|aic| FitResult {
            kind: FitKind::Gaussian,
            ncomps: 1,
            params: vec![1.0, 0.0, 1.0],
            errors: vec![0.1; 3],
            aic,
            chisq: aic - 6.0,
            redchisq: 1.0,
            rms: 0.1,
            residual_rms: 0.1,
        });
        SpectrumTask {
            index,
            coordinates: PixelCoord { x: index, y: 0 },
            spectrum: Vec::new(),
            rms: 0.1,
            provenance: Provenance { container: 0, region },
            guesses_from_parent: vec![1.0, 0.0, 1.0],
            guesses_updated: None,
            template: None,
            state: if model.is_some() { TaskState::Converged } else { TaskState::Exhausted },
            model,
        }
    }

    fn run() -> (Decomposition, BTreeMap<usize, CompiledSpectrum>) {
        let completed = vec![
            done(0, 0, Some(10.0)),
            done(0, 1, Some(12.0)),
            done(1, 0, Some(10.0)),
            done(1, 1, Some(10.001)),
            done(2, 0, None),
        ];
        let compiled = compile_spectra(&completed, &NoProgress);
        let decomposition = Decomposition {
            completed,
            iterations: vec![IterationStats { iteration: 1, dispatched: 5, converged: 4, exhausted: 1, retry: 0 }],
            abandoned: 0,
        };
        (decomposition, compiled)
    }

    #[test]
    fn stats_count_candidates_and_solutions() {
        let (decomposition, compiled) = run();
        let stats = DecompositionStats::from_run(&decomposition, &compiled);
        assert_eq!(stats, DecompositionStats {
            tasks: 5,
            iterations: 1,
            converged: 4,
            exhausted: 1,
            abandoned: 0,
            pixels: 3,
            multi_candidate: 2,
            multi_solution: 1,
            null_pixels: 1,
        });
    }

    #[test]
    fn pixel_table_is_limited_to_top() {
        let (_, compiled) = run();
        let table = format_pixel_table(&compiled, 2);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[2].contains("0/0,0/1"));
        assert_eq!(lines[4], "... 1 more pixels");
        assert!(lines.iter().all(|l| l.trim_end() == *l));
    }

    #[test]
    fn detail_marks_representative() {
        let (_, compiled) = run();
        let detail = format_pixel_detail(&compiled[&0]);
        assert!(detail.contains("* aic=10.00"));
        assert!(detail.contains("  aic=12.00"));
        assert!(detail.contains("    #0 params=[1.0000, 0.0000, 1.0000] errors=[0.1000, 0.1000, 0.1000]"));
        assert!(!detail.contains("#1"));
        assert!(format_pixel_detail(&compiled[&2]).contains("* no model"));
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("abcdef", 4), "abc.");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
