//! Spectral line-shape model implementations.
//!
//! Models are implemented as small, pure functions so that the fitting code can
//! stay generic over the line-shape family.

pub mod model;

pub use model::*;
