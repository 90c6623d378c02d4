//! Persisted task-log state machine.
//!
//! One [`TaskLog`] records one workflow execution: the overall phase plus
//! an ordered list of per-phase [`TaskLogDetail`] records. Details form a
//! strict, non-branching sequence matching the owning chain's declared
//! order; retrying a failed phase reuses the same detail record rather
//! than appending a new one. [`TaskRetryLog`] entries are the append-only
//! audit trail of those retries.

use chrono::{DateTime, Utc};
use krane_common::ResourceStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall phase of a task log (and status of a single detail).
///
/// Wire strings: `waiting|running|success|failed`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Waiting,
    Running,
    Success,
    Failed,
}

impl TaskPhase {
    /// Phases a task log can legally be left in across a process restart
    pub const TERMINAL: [TaskPhase; 2] = [TaskPhase::Success, TaskPhase::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Waiting => "waiting",
            TaskPhase::Running => "running",
            TaskPhase::Success => "success",
            TaskPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operation type a task log was created for.
///
/// Wire strings: `CLUSTER_CREATE|CLUSTER_ADD_WORKER|CLUSTER_UPGRADE|CLUSTER_RESET|CLUSTER_BACKUP|CLUSTER_RESTORE`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operation {
    #[serde(rename = "CLUSTER_CREATE")]
    Create,
    #[serde(rename = "CLUSTER_ADD_WORKER")]
    AddWorker,
    #[serde(rename = "CLUSTER_UPGRADE")]
    Upgrade,
    #[serde(rename = "CLUSTER_RESET")]
    Reset,
    #[serde(rename = "CLUSTER_BACKUP")]
    Backup,
    #[serde(rename = "CLUSTER_RESTORE")]
    Restore,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CLUSTER_CREATE",
            Operation::AddWorker => "CLUSTER_ADD_WORKER",
            Operation::Upgrade => "CLUSTER_UPGRADE",
            Operation::Reset => "CLUSTER_RESET",
            Operation::Backup => "CLUSTER_BACKUP",
            Operation::Restore => "CLUSTER_RESTORE",
        }
    }

    /// Cluster status while this operation is in flight.
    /// `None` leaves the cluster status untouched (backup/restore run
    /// against a live cluster).
    pub fn transition_status(&self) -> Option<ResourceStatus> {
        match self {
            Operation::Create => Some(ResourceStatus::Creating),
            Operation::AddWorker => Some(ResourceStatus::Initializing),
            Operation::Upgrade => Some(ResourceStatus::Upgrading),
            Operation::Reset => Some(ResourceStatus::Terminating),
            Operation::Backup | Operation::Restore => None,
        }
    }

    /// Cluster status after this operation completes successfully
    pub fn success_status(&self) -> Option<ResourceStatus> {
        match self {
            Operation::Create | Operation::AddWorker | Operation::Upgrade => {
                Some(ResourceStatus::Running)
            }
            Operation::Reset => Some(ResourceStatus::NotReady),
            Operation::Backup | Operation::Restore => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One phase's execution record within a task log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskLogDetail {
    pub id: Uuid,
    pub task_log_id: Uuid,
    pub cluster_id: Uuid,
    /// Phase name; must match a registered phase of the owning chain
    pub task: String,
    pub status: TaskPhase,
    #[serde(default)]
    pub message: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub last_probe_time: DateTime<Utc>,
}

impl TaskLogDetail {
    /// Create a detail in running state with start time = now
    pub fn start(task_log_id: Uuid, cluster_id: Uuid, task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_log_id,
            cluster_id,
            task: task.into(),
            status: TaskPhase::Running,
            message: String::new(),
            start_time: now,
            end_time: None,
            last_probe_time: now,
        }
    }

    /// Mark the detail successful with end time = now
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = TaskPhase::Success;
        self.end_time = Some(now);
        self.last_probe_time = now;
    }

    /// Mark the detail failed, capturing the error text verbatim
    pub fn fail(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.status = TaskPhase::Failed;
        self.message = message.into();
        self.end_time = Some(now);
        self.last_probe_time = now;
    }

    /// Reset a failed detail for a retry: same identity, fresh start
    /// time, cleared message
    pub fn reopen(&mut self) {
        let now = Utc::now();
        self.status = TaskPhase::Running;
        self.message.clear();
        self.start_time = now;
        self.end_time = None;
        self.last_probe_time = now;
    }
}

/// One workflow execution instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskLog {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub operation: Operation,
    pub phase: TaskPhase,
    #[serde(default)]
    pub message: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: Vec<TaskLogDetail>,
}

impl TaskLog {
    pub fn new(cluster_id: Uuid, operation: Operation) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id,
            operation,
            phase: TaskPhase::Waiting,
            message: String::new(),
            start_time: Utc::now(),
            end_time: None,
            details: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The single detail currently in running or failed state. `None`
    /// means the workflow has no runnable work left.
    pub fn current_detail(&self) -> Option<&TaskLogDetail> {
        self.details
            .iter()
            .find(|d| matches!(d.status, TaskPhase::Running | TaskPhase::Failed))
    }

    /// Close out the task log, force-ending any detail still running.
    /// Used on terminal transitions and by shutdown paths.
    pub fn end(&mut self, success: bool, message: impl Into<String>) {
        let message = message.into();
        let status = if success {
            TaskPhase::Success
        } else {
            TaskPhase::Failed
        };
        let now = Utc::now();
        self.phase = status;
        self.end_time = Some(now);
        for detail in &mut self.details {
            if detail.status == TaskPhase::Running {
                detail.status = status;
                detail.message = message.clone();
                detail.end_time = Some(now);
            }
        }
        self.message = message;
    }
}

/// Audit record of one resume action. Append-only; never consulted by
/// the state machine itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRetryLog {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub task_log_id: Uuid,
    pub message: String,
    pub last_failed_time: DateTime<Utc>,
    pub restart_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_wire_strings() {
        assert_eq!(
            serde_json::to_string(&TaskPhase::Waiting).unwrap(),
            "\"waiting\""
        );
        assert_eq!(
            serde_json::to_string(&TaskPhase::Failed).unwrap(),
            "\"failed\""
        );
        assert!(TaskPhase::Success.is_terminal());
        assert!(!TaskPhase::Running.is_terminal());
    }

    #[test]
    fn test_operation_wire_strings() {
        assert_eq!(
            serde_json::to_string(&Operation::AddWorker).unwrap(),
            "\"CLUSTER_ADD_WORKER\""
        );
        let parsed: Operation = serde_json::from_str("\"CLUSTER_UPGRADE\"").unwrap();
        assert_eq!(parsed, Operation::Upgrade);
    }

    #[test]
    fn test_detail_lifecycle() {
        let log = TaskLog::new(Uuid::new_v4(), Operation::Create);
        let mut detail = TaskLogDetail::start(log.id, log.cluster_id, "BasicConfigSystem");
        assert_eq!(detail.status, TaskPhase::Running);
        assert!(detail.end_time.is_none());

        detail.complete();
        assert_eq!(detail.status, TaskPhase::Success);
        assert!(detail.end_time.is_some());
    }

    #[test]
    fn test_detail_reopen_keeps_identity() {
        let mut detail = TaskLogDetail::start(Uuid::new_v4(), Uuid::new_v4(), "InitEtcd");
        let id = detail.id;
        detail.fail("ssh timeout");
        let failed_start = detail.start_time;

        detail.reopen();
        assert_eq!(detail.id, id);
        assert_eq!(detail.status, TaskPhase::Running);
        assert!(detail.message.is_empty());
        assert!(detail.end_time.is_none());
        assert!(detail.start_time >= failed_start);
    }

    #[test]
    fn test_current_detail() {
        let mut log = TaskLog::new(Uuid::new_v4(), Operation::Create);
        assert!(log.current_detail().is_none());

        let mut first = TaskLogDetail::start(log.id, log.cluster_id, "BasicConfigSystem");
        first.complete();
        log.details.push(first);
        assert!(log.current_detail().is_none());

        let second = TaskLogDetail::start(log.id, log.cluster_id, "Install Container Runtime");
        log.details.push(second);
        assert_eq!(
            log.current_detail().unwrap().task,
            "Install Container Runtime"
        );
    }

    #[test]
    fn test_end_closes_running_details() {
        let mut log = TaskLog::new(Uuid::new_v4(), Operation::Upgrade);
        log.details
            .push(TaskLogDetail::start(log.id, log.cluster_id, "upgradeCluster"));

        log.end(false, "runner lost connection");
        assert_eq!(log.phase, TaskPhase::Failed);
        assert!(log.end_time.is_some());
        assert_eq!(log.details[0].status, TaskPhase::Failed);
        assert_eq!(log.details[0].message, "runner lost connection");
    }
}
