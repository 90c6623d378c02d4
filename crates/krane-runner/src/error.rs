//! Error types for automation runner invocations

use thiserror::Error;

/// Error type for runner invocations
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The playbook ran and reported failure; message is the runner's
    /// verbatim failure text
    #[error("playbook '{playbook}' failed: {message}")]
    PlaybookFailed { playbook: String, message: String },

    /// The runner could not be reached or spawned at all
    #[error("runner unavailable: {0}")]
    Unavailable(String),

    /// Writing to the log sink failed
    #[error("log sink error: {0}")]
    LogSink(#[from] std::io::Error),
}

impl RunnerError {
    pub fn playbook_failed(playbook: impl Into<String>, message: impl Into<String>) -> Self {
        RunnerError::PlaybookFailed {
            playbook: playbook.into(),
            message: message.into(),
        }
    }
}

/// Result type for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;
