//! Resume controller.
//!
//! Resuming a failed workflow reopens exactly the details that failed,
//! appends an audit record for each, and rewinds the overall phase to
//! waiting so the driver picks up where it stopped. Earlier successful
//! details are untouched and never re-executed. A workflow failed by
//! crash recovery is resumed the same way as one failed organically.

use crate::error::{AdmError, Result};
use crate::tasklog::{Operation, TaskLog, TaskPhase, TaskRetryLog};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

/// Result of a successful resume: the reopened task log plus the audit
/// records to append
#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    pub task_log: TaskLog,
    pub retry_logs: Vec<TaskRetryLog>,
}

/// Reopen `task_log` for the given operation.
///
/// `task_active` is the caller's answer to "is a workflow currently
/// active for this cluster" — the store-backed check happens at the
/// boundary that can see the cluster's current-task pointer.
pub fn resume(
    mut task_log: TaskLog,
    requested: Operation,
    task_active: bool,
) -> Result<ResumeOutcome> {
    if task_active {
        return Err(AdmError::TaskInExecution);
    }
    if task_log.operation != requested {
        return Err(AdmError::OperationMismatch {
            requested,
            stored: task_log.operation,
        });
    }

    let now = Utc::now();
    let mut retry_logs = Vec::new();
    for detail in &mut task_log.details {
        if detail.status != TaskPhase::Failed {
            continue;
        }
        retry_logs.push(TaskRetryLog {
            id: Uuid::new_v4(),
            cluster_id: task_log.cluster_id,
            task_log_id: task_log.id,
            message: detail.message.clone(),
            last_failed_time: detail.end_time.unwrap_or(now),
            restart_time: now,
        });
        detail.reopen();
    }

    task_log.phase = TaskPhase::Waiting;
    task_log.message.clear();
    task_log.end_time = None;

    info!(
        task_log = %task_log.id,
        operation = %requested,
        retries = retry_logs.len(),
        "workflow reopened for retry"
    );
    Ok(ResumeOutcome {
        task_log,
        retry_logs,
    })
}
