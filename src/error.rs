//! Error types for Agentpod

use thiserror::Error;

/// Exit code for a run that ended because of an interrupt or terminate signal
pub const EXIT_SIGNAL: i32 = 130;

/// Exit code for configuration problems detected before any workload starts
pub const EXIT_CONFIG: i32 = 2;

#[derive(Error, Debug)]
pub enum PodError {
    #[error("Missing required secret: {0}")]
    MissingRequiredSecret(String),

    #[error("Malformed environment descriptor (line {line}): {reason}")]
    MalformedDescriptor { line: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Image build failed: {0}")]
    BuildFailed(String),

    #[error("Image push failed: {0}")]
    PushFailed(String),

    #[error("Session error: {0}")]
    SessionFailed(String),

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Interrupted by signal during {0}")]
    Cancelled(String),

    #[error("Failed to install signal handler: {0}")]
    Signal(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl PodError {
    /// Whether this error was caught before any workload was touched
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PodError::MissingRequiredSecret(_)
                | PodError::MalformedDescriptor { .. }
                | PodError::InvalidConfig(_)
        )
    }

    /// Process exit code the command layer reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PodError::Cancelled(_) => EXIT_SIGNAL,
            e if e.is_config_error() => EXIT_CONFIG,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, PodError>;
