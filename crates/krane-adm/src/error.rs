//! Error types for workflow orchestration

use crate::tasklog::Operation;
use krane_runner::RunnerError;
use thiserror::Error;

/// Error type for workflow orchestration
#[derive(Debug, Error)]
pub enum AdmError {
    /// A workflow is already active for the cluster. The string form is
    /// a stable error code surfaced to callers.
    #[error("TASK_IN_EXECUTION")]
    TaskInExecution,

    /// Resume was requested for a different operation than the stored
    /// task log was created for
    #[error("task operation mismatch: requested {requested}, stored {stored}")]
    OperationMismatch {
        requested: Operation,
        stored: Operation,
    },

    /// A persisted detail names a phase the registry does not know.
    /// Only reachable when a task log is replayed against the wrong chain.
    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    /// The automation runner reported a fatal step failure
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Task log state violates a driver invariant
    #[error("invalid task state: {0}")]
    InvalidState(String),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, AdmError>;
