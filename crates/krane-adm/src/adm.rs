//! The workflow driver.
//!
//! `ClusterAdm` advances a workflow by at most one phase per tick. All
//! mutation happens on an in-memory [`TaskHelper`] snapshot; the hosting
//! runtime publishes the snapshot for persistence after every tick, so a
//! tick whose persistence fails simply leaves the stored state where it
//! was and the workflow resumes from there.

use crate::error::{AdmError, Result};
use crate::phase::PhaseContext;
use crate::registry::{ChainParams, PhaseRegistry};
use crate::tasklog::{Operation, TaskLog, TaskLogDetail, TaskPhase};
use krane_runner::{InventoryVars, LogSink, Runner};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Mutable execution snapshot of one workflow.
///
/// Carries everything a tick needs: the task log's details and overall
/// status, the inventory snapshotted at launch, and the shared log sink.
/// It is cheap to clone and is the value handed over the single-slot
/// channel to the reconciliation loop.
#[derive(Clone)]
pub struct TaskHelper {
    pub cluster_id: Uuid,
    pub task_log_id: Uuid,
    pub status: TaskPhase,
    pub message: String,
    pub details: Vec<TaskLogDetail>,
    pub inventory: InventoryVars,
    pub sink: LogSink,
}

impl TaskHelper {
    pub fn new(task_log: &TaskLog, inventory: InventoryVars, sink: LogSink) -> Self {
        Self {
            cluster_id: task_log.cluster_id,
            task_log_id: task_log.id,
            status: task_log.phase,
            message: task_log.message.clone(),
            details: task_log.details.clone(),
            inventory,
            sink,
        }
    }

    /// Index of the single detail in running or failed state
    pub fn current_index(&self) -> Option<usize> {
        self.details
            .iter()
            .position(|d| matches!(d.status, TaskPhase::Running | TaskPhase::Failed))
    }

    /// Copy this snapshot's progress back onto the persisted record
    pub fn apply_to(&self, task_log: &mut TaskLog) {
        task_log.phase = self.status;
        task_log.message = self.message.clone();
        task_log.details = self.details.clone();
    }
}

/// State-machine driver for one workflow instance
pub struct ClusterAdm {
    operation: Operation,
    registry: PhaseRegistry,
}

impl ClusterAdm {
    pub fn new(operation: Operation, params: &ChainParams) -> Self {
        Self {
            operation,
            registry: PhaseRegistry::for_operation(operation, params),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    /// Advance the workflow by at most one phase.
    ///
    /// - No runnable detail and a non-empty history: the workflow is
    ///   complete; nothing is touched.
    /// - Empty history: the chain's first phase is seeded as running.
    /// - Otherwise the current phase runs; success records the outcome
    ///   and seeds the next phase (or marks the workflow successful),
    ///   failure records the error verbatim and stops.
    ///
    /// `Err` is reserved for driver faults (unknown phase name, empty
    /// chain); handler failures are recorded in the snapshot and return
    /// `Ok`.
    pub async fn tick(&self, helper: &mut TaskHelper, runner: &dyn Runner) -> Result<()> {
        let index = match helper.current_index() {
            Some(index) => index,
            None if helper.details.is_empty() => {
                let first = self
                    .registry
                    .first()
                    .ok_or_else(|| AdmError::InvalidState("empty phase chain".to_string()))?;
                debug!(operation = %self.operation, phase = first.name(), "seeding first phase");
                helper.details.push(TaskLogDetail::start(
                    helper.task_log_id,
                    helper.cluster_id,
                    first.name(),
                ));
                helper.details.len() - 1
            }
            // no runnable detail left: the workflow is complete.
            // Re-invoking an already-successful workflow is a no-op.
            None => {
                if helper.status != TaskPhase::Success {
                    helper.status = TaskPhase::Success;
                    helper.message.clear();
                }
                return Ok(());
            }
        };

        let task_name = helper.details[index].task.clone();
        let phase = self
            .registry
            .get(&task_name)
            .ok_or_else(|| AdmError::UnknownPhase(task_name.clone()))?;

        if helper.status == TaskPhase::Waiting {
            helper.status = TaskPhase::Running;
        }
        // a detail left in failed state is re-run in place
        if helper.details[index].status == TaskPhase::Failed {
            helper.details[index].reopen();
        }

        let ctx = PhaseContext {
            runner,
            inventory: &helper.inventory,
            sink: &helper.sink,
        };
        match phase.run(&ctx).await {
            Ok(()) => {
                helper.details[index].complete();
                info!(operation = %self.operation, phase = %task_name, "phase completed");
                match self.registry.next_after(&task_name) {
                    Some(next) => {
                        helper.details.push(TaskLogDetail::start(
                            helper.task_log_id,
                            helper.cluster_id,
                            next.name(),
                        ));
                    }
                    None => {
                        helper.status = TaskPhase::Success;
                        helper.message.clear();
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(operation = %self.operation, phase = %task_name, error = %message, "phase failed");
                helper.details[index].fail(&message);
                helper.status = TaskPhase::Failed;
                helper.message = message;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry;
    use krane_runner::{FailingRunner, NoopRunner, ScriptedRunner};

    fn helper_for(task_log: &TaskLog) -> TaskHelper {
        TaskHelper::new(task_log, InventoryVars::new(), LogSink::discard())
    }

    /// Drive until terminal, with a tick budget so a broken driver fails
    /// the test instead of hanging it
    async fn drive(adm: &ClusterAdm, helper: &mut TaskHelper, runner: &dyn Runner) {
        for _ in 0..64 {
            adm.tick(helper, runner).await.unwrap();
            if helper.status.is_terminal() {
                return;
            }
        }
        panic!("workflow did not reach a terminal state");
    }

    #[tokio::test]
    async fn test_full_chain_runs_in_order() {
        let adm = ClusterAdm::new(Operation::AddWorker, &ChainParams::default());
        let task_log = TaskLog::new(Uuid::new_v4(), Operation::AddWorker);
        let mut helper = helper_for(&task_log);
        let runner = NoopRunner::new();

        drive(&adm, &mut helper, &runner).await;

        // P1: N details, chain order, all successful, strictly
        // increasing start times
        assert_eq!(helper.status, TaskPhase::Success);
        assert_eq!(helper.details.len(), adm.registry().len());
        let expected: Vec<&str> = adm.registry().names();
        let actual: Vec<&str> = helper.details.iter().map(|d| d.task.as_str()).collect();
        assert_eq!(actual, expected);
        assert!(helper.details.iter().all(|d| d.status == TaskPhase::Success));
        for window in helper.details.windows(2) {
            assert!(window[0].start_time < window[1].start_time);
        }
    }

    #[tokio::test]
    async fn test_failure_stops_the_chain() {
        let adm = ClusterAdm::new(Operation::Create, &ChainParams::default());
        let task_log = TaskLog::new(Uuid::new_v4(), Operation::Create);
        let mut helper = helper_for(&task_log);
        // third real phase fails
        let runner = ScriptedRunner::new().fail_once("02-runtime.yml", "ssh timeout");

        drive(&adm, &mut helper, &runner).await;

        assert_eq!(helper.status, TaskPhase::Failed);
        let failed = helper.details.last().unwrap();
        assert_eq!(failed.task, "Install Container Runtime");
        assert_eq!(failed.status, TaskPhase::Failed);
        assert!(failed.message.contains("ssh timeout"));
        assert!(helper.message.contains("ssh timeout"));
        // nothing after the failed phase was seeded
        assert_eq!(helper.details.len(), 3);
        assert_eq!(helper.details[0].status, TaskPhase::Success);
        assert_eq!(helper.details[1].status, TaskPhase::Success);
    }

    #[tokio::test]
    async fn test_completed_workflow_tick_is_noop() {
        let adm = ClusterAdm::new(Operation::Backup, &ChainParams::default());
        let task_log = TaskLog::new(Uuid::new_v4(), Operation::Backup);
        let mut helper = helper_for(&task_log);
        let runner = NoopRunner::new();

        drive(&adm, &mut helper, &runner).await;
        assert_eq!(helper.status, TaskPhase::Success);

        // P3: a further tick mutates nothing
        let before = helper.details.clone();
        adm.tick(&mut helper, &runner).await.unwrap();
        assert_eq!(helper.status, TaskPhase::Success);
        assert_eq!(helper.details, before);
    }

    #[tokio::test]
    async fn test_unknown_phase_is_a_driver_error() {
        let adm = ClusterAdm::new(Operation::Reset, &ChainParams::default());
        let task_log = TaskLog::new(Uuid::new_v4(), Operation::Reset);
        let mut helper = helper_for(&task_log);
        helper.details.push(TaskLogDetail::start(
            helper.task_log_id,
            helper.cluster_id,
            "upgradeCluster",
        ));

        let err = adm
            .tick(&mut helper, &NoopRunner::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmError::UnknownPhase(_)));
    }

    #[tokio::test]
    async fn test_failed_phase_error_text_is_verbatim() {
        let adm = ClusterAdm::new(Operation::Upgrade, &ChainParams::default());
        let task_log = TaskLog::new(Uuid::new_v4(), Operation::Upgrade);
        let mut helper = helper_for(&task_log);
        let runner = FailingRunner::new("connection reset by peer");

        drive(&adm, &mut helper, &runner).await;

        assert_eq!(helper.status, TaskPhase::Failed);
        assert_eq!(
            helper.details[0].message,
            "playbook '92-upgrade-cluster.yml' failed: connection reset by peer"
        );
    }

    /// The worked scenario: chain [A, B, C]; A succeeds, B fails with
    /// "ssh timeout"; resume; B and C then succeed.
    #[tokio::test]
    async fn test_fail_resume_complete_scenario() {
        let cluster_id = Uuid::new_v4();
        let adm = ClusterAdm::new(Operation::Restore, &ChainParams::default());
        let mut task_log = TaskLog::new(cluster_id, Operation::Restore);
        let runner = ScriptedRunner::new().fail_once("96-restart-cluster.yml", "ssh timeout");

        let mut helper = helper_for(&task_log);
        drive(&adm, &mut helper, &runner).await;
        helper.apply_to(&mut task_log);

        assert_eq!(task_log.phase, TaskPhase::Failed);
        assert_eq!(task_log.details[0].status, TaskPhase::Success);
        assert_eq!(task_log.details[1].status, TaskPhase::Failed);
        assert!(task_log.details[1].message.contains("ssh timeout"));
        let failed_detail_id = task_log.details[1].id;

        // operator resumes
        let outcome = retry::resume(task_log, Operation::Restore, false).unwrap();
        let task_log = outcome.task_log;
        assert_eq!(task_log.phase, TaskPhase::Waiting);
        assert_eq!(outcome.retry_logs.len(), 1);
        assert!(outcome.retry_logs[0].message.contains("ssh timeout"));

        // P2: detail identity is preserved, completed work is skipped
        assert_eq!(task_log.details[1].id, failed_detail_id);
        assert_eq!(task_log.details[1].status, TaskPhase::Running);

        let mut helper = helper_for(&task_log);
        drive(&adm, &mut helper, &runner).await;

        assert_eq!(helper.status, TaskPhase::Success);
        assert_eq!(helper.details.len(), 2);
        assert!(helper.details.iter().all(|d| d.status == TaskPhase::Success));
        // the restore playbook ran exactly once despite the retry
        let calls = runner.calls();
        assert_eq!(
            calls
                .iter()
                .filter(|c| c.as_str() == "95-restore-cluster.yml")
                .count(),
            1
        );
        assert_eq!(
            calls
                .iter()
                .filter(|c| c.as_str() == "96-restart-cluster.yml")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_upgrade_chain_passes_version_var() {
        struct VarCapture(std::sync::Mutex<Option<String>>);

        #[async_trait::async_trait]
        impl Runner for VarCapture {
            async fn run(
                &self,
                _playbook: &str,
                _tag: &str,
                inventory: &InventoryVars,
                _sink: &LogSink,
            ) -> krane_runner::Result<()> {
                *self.0.lock().unwrap() =
                    inventory.var("kube_upgrade_version").map(str::to_string);
                Ok(())
            }
        }

        let params = ChainParams {
            upgrade_version: Some("v1.29.0".to_string()),
            ..Default::default()
        };
        let adm = ClusterAdm::new(Operation::Upgrade, &params);
        let task_log = TaskLog::new(Uuid::new_v4(), Operation::Upgrade);
        let mut helper = helper_for(&task_log);
        let runner = VarCapture(std::sync::Mutex::new(None));

        drive(&adm, &mut helper, &runner).await;

        assert_eq!(helper.status, TaskPhase::Success);
        assert_eq!(*runner.0.lock().unwrap(), Some("v1.29.0".to_string()));
    }
}
