//! `scouse-decomp` library crate.
//!
//! The binary (`scouse`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitting capability and cube source can be swapped behind traits
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod cube;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
