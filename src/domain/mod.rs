//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the region hierarchy (`AveragingRegion`, `RegionContainer`)
//! - per-pixel fitting state (`SpectrumTask`, `TaskState`)
//! - fit outputs (`FitResult`, `CompiledSpectrum`, `Provenance`)
//! - the run configuration (`DecompositionConfig`, `Tolerances`)

pub mod types;

pub use types::*;
