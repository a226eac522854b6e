//! Command-line parsing for the autonomous decomposition engine.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::FitKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "scouse", version, about = "Autonomous per-pixel decomposition of spectral cubes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decompose a cube from a run input JSON (cube + seeded region hierarchy).
    Run(RunArgs),
    /// Generate a synthetic cube and hierarchy, then decompose it.
    Demo(DemoArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Run input JSON file.
    #[arg(short, long, value_name = "JSON")]
    pub input: PathBuf,

    #[command(flatten)]
    pub decompose: DecomposeArgs,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Random seed for the synthetic cube.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Map width (pixels).
    #[arg(long, default_value_t = 8)]
    pub nx: usize,

    /// Map height (pixels).
    #[arg(long, default_value_t = 8)]
    pub ny: usize,

    /// Number of spectral channels.
    #[arg(long, default_value_t = 120)]
    pub nchan: usize,

    /// Noise rms of the synthetic data.
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Averaging-region widths, coarse to fine (comma separated).
    #[arg(long, value_delimiter = ',', default_values_t = vec![4, 2])]
    pub widths: Vec<usize>,

    #[command(flatten)]
    pub decompose: DecomposeArgs,
}

/// Options shared by every decomposition run.
#[derive(Debug, Args, Clone)]
pub struct DecomposeArgs {
    /// Line-shape family.
    #[arg(long, value_enum, default_value_t = FitKind::Gaussian)]
    pub fit_kind: FitKind,

    /// Maximum difference in component count between a pixel and its region.
    #[arg(long, default_value_t = 2)]
    pub max_component_delta: usize,

    /// Minimum peak signal-to-noise of a component.
    #[arg(long, default_value_t = 3.0)]
    pub snr_min: f64,

    /// Minimum FWHM of a component, in channels.
    #[arg(long, default_value_t = 1.0)]
    pub min_width_channels: f64,

    /// Maximum sigma ratio between a component and its parent.
    #[arg(long, default_value_t = 2.5)]
    pub width_ratio: f64,

    /// Maximum centroid shift from the parent, in parent sigmas.
    #[arg(long, default_value_t = 2.5)]
    pub velocity_shift: f64,

    /// Components closer than this fraction of the narrower FWHM are merged.
    #[arg(long, default_value_t = 0.5)]
    pub min_separation: f64,

    /// Worker threads for fitting (1 = serial).
    #[arg(short = 'j', long, env = "SCOUSE_NJOBS", default_value_t = 1)]
    pub njobs: usize,

    /// Fallback noise level when a spectrum's rms cannot be estimated.
    #[arg(long, env = "SCOUSE_RMS_APPROX", default_value_t = 0.1)]
    pub rms_approx: f64,

    /// Ceiling on retry iterations.
    #[arg(long, env = "SCOUSE_MAX_ITERATIONS", default_value_t = 100)]
    pub max_iterations: usize,

    /// Lower edge of the fitted velocity window (km/s).
    #[arg(long, requires = "vmax", allow_negative_numbers = true)]
    pub vmin: Option<f64>,

    /// Upper edge of the fitted velocity window (km/s).
    #[arg(long, requires = "vmin", allow_negative_numbers = true)]
    pub vmax: Option<f64>,

    /// Show the first N pixels of the compiled result.
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Print the per-iteration batch table.
    #[arg(long)]
    pub iterations: bool,

    /// Print every candidate for one pixel (flat index).
    #[arg(long, value_name = "INDEX")]
    pub detail: Option<usize>,
}
