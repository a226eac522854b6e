//! Application error type.
//!
//! Every fallible stage returns `Result<_, AppError>`. The exit code is carried
//! along so the binary can map failures onto a process status without a
//! second error taxonomy.
//!
//! - `2`: invalid input, configuration or cube metadata
//! - `3`: not enough data to run a stage
//! - `4`: numerical or internal failure

pub const EXIT_INVALID_INPUT: u8 = 2;
pub const EXIT_INSUFFICIENT_DATA: u8 = 3;
pub const EXIT_INTERNAL: u8 = 4;

#[derive(Clone, PartialEq, Eq)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INVALID_INPUT, message)
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::new(EXIT_INSUFFICIENT_DATA, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EXIT_INTERNAL, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
