//! Input helpers.
//!
//! - run input JSON loading + validation (`input`)

pub mod input;

pub use input::*;
