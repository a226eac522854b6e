//! Cube data source.
//!
//! - `CubeSource`: the read-only interface the decomposition core relies on
//! - `DataCube`: an in-memory implementation (loaded from a run input file or
//!   generated synthetically)
//! - `noise`: per-spectrum rms estimation

pub mod cube;
pub mod noise;

pub use cube::*;
pub use noise::*;
