//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments
//! - loads or generates the cube and region hierarchy
//! - runs the decomposition pipeline
//! - prints reports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DecomposeArgs, DemoArgs, RunArgs};
use crate::data::{SampleSpec, generate_sample};
use crate::domain::{DecompositionConfig, Tolerances, TrimWindow};
use crate::error::AppError;
use crate::fit::Decomposer;
use crate::report::LogProgress;

pub mod pipeline;

/// Default log filter when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "scouse_decomp=info";

/// Entry point for the `scouse` binary.
pub fn run() -> Result<(), AppError> {
    // Optional; a missing .env is not an error.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Logs go to stderr so stdout carries only the report.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = decomposition_config_from_args(&args.decompose);
    config.validate()?;

    info!(input = %args.input.display(), "loading run input");
    let mut input = crate::io::load_run_input(&args.input, config.fit_kind)?;
    pipeline::prepare_cube(&mut input.cube, &config)?;

    let run = pipeline::run_decomposition(&input.cube, &input.regions, &config, &Decomposer::default(), &LogProgress)?;
    print_report(&args.input.display().to_string(), &run, &config, &args.decompose);
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = decomposition_config_from_args(&args.decompose);
    config.validate()?;

    let spec = SampleSpec {
        seed: args.seed,
        nx: args.nx,
        ny: args.ny,
        nchan: args.nchan,
        noise: args.noise,
        widths: args.widths.clone(),
        ..SampleSpec::default()
    };
    info!(seed = spec.seed, nx = spec.nx, ny = spec.ny, widths = ?spec.widths, "generating synthetic cube");

    let fitter = Decomposer::default();
    let mut sample = generate_sample(&spec, &fitter)?;
    pipeline::prepare_cube(&mut sample.cube, &config)?;

    let run = pipeline::run_decomposition(&sample.cube, &sample.hierarchy, &config, &fitter, &LogProgress)?;
    let source = format!("synthetic {}x{} (seed {})", spec.nx, spec.ny, spec.seed);
    print_report(&source, &run, &config, &args.decompose);
    Ok(())
}

fn print_report(source: &str, run: &pipeline::RunOutput, config: &DecompositionConfig, args: &DecomposeArgs) {
    println!(
        "{}",
        crate::report::format_run_summary(source, &run.template, config, &run.stats, run.elapsed())
    );
    if args.iterations {
        println!("{}", crate::report::format_iterations(&run.decomposition.iterations));
    }
    println!("{}", crate::report::format_pixel_table(&run.compiled, args.top));

    if let Some(index) = args.detail {
        match run.compiled.get(&index) {
            Some(spec) => println!("{}", crate::report::format_pixel_detail(spec)),
            None => println!("Pixel {index} received no fit."),
        }
    }
}

pub fn decomposition_config_from_args(args: &DecomposeArgs) -> DecompositionConfig {
    let trim = match (args.vmin, args.vmax) {
        (Some(vmin), Some(vmax)) => Some(TrimWindow { vmin, vmax }),
        _ => None,
    };

    DecompositionConfig {
        tol: Tolerances {
            max_component_delta: args.max_component_delta,
            snr_min: args.snr_min,
            min_width_channels: args.min_width_channels,
            width_ratio: args.width_ratio,
            velocity_shift: args.velocity_shift,
            min_separation: args.min_separation,
        },
        fit_kind: args.fit_kind,
        njobs: args.njobs,
        rms_approx: args.rms_approx,
        max_iterations: args.max_iterations,
        trim,
    }
}
