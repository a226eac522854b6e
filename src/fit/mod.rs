//! Autonomous decomposition.
//!
//! Stages, in run order:
//!
//! - build the shared spectral template
//! - turn every pixel of every fitted averaging region into a task
//! - fit tasks in batches until each converges or runs out of guesses
//! - compile the candidates of each pixel into one result

pub mod compile;
pub mod decomposer;
pub mod dispatch;
pub mod executor;
pub mod guardrails;
pub mod scheduler;
pub mod tasks;
pub mod template;

pub use compile::*;
pub use decomposer::*;
pub use dispatch::*;
pub use executor::*;
pub use scheduler::*;
pub use tasks::*;
pub use template::*;
