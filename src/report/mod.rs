//! Reporting: progress notifications and formatted terminal output.

pub mod format;
pub mod progress;

pub use format::*;
pub use progress::{LogProgress, NoProgress, ProgressEvent, ProgressSink};
