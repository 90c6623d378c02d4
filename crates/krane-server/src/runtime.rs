//! Per-workflow runtime.
//!
//! Two cooperating tasks per active workflow: a driver loop that ticks
//! [`ClusterAdm`] on a cancellable timer and publishes its snapshot over
//! a single-slot channel, and a reconciliation loop that persists each
//! snapshot and performs the terminal bookkeeping. Persistence is
//! thereby serialized per workflow; a failed save leaves the stored
//! state at the last successful tick, which the next snapshot overwrites
//! wholesale.

use crate::events::{Event, EventManager};
use crate::notify::{notify_best_effort, Notifier, Scope};
use krane_adm::{ClusterAdm, Operation, TaskHelper, TaskLog, TaskPhase};
use krane_common::{Cluster, ResourceStatus};
use krane_runner::Runner;
use krane_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Shared pieces every workflow runtime borrows
#[derive(Clone)]
pub struct WorkflowRuntime {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub events: EventManager,
    pub poll_interval: Duration,
}

impl WorkflowRuntime {
    /// Drive one workflow to a terminal state (or until shutdown).
    ///
    /// Exits once the terminal state has been persisted, or when the
    /// shutdown signal fires first — in the latter case the store keeps
    /// its non-terminal snapshot and the crash-recovery hook reconciles
    /// it on the next start.
    pub async fn run(
        &self,
        runner: Arc<dyn Runner>,
        mut cluster: Cluster,
        mut task_log: TaskLog,
        adm: ClusterAdm,
        mut helper: TaskHelper,
        shutdown: watch::Receiver<bool>,
    ) {
        let operation = adm.operation();
        info!(cluster = %cluster.name, %operation, task_log = %task_log.id, "workflow started");
        self.events.publish(Event::TaskStarted {
            cluster_id: cluster.id,
            operation,
        });

        // single-slot handoff: the driver parks until the previous
        // snapshot has been consumed
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<TaskHelper>(1);
        let poll_interval = self.poll_interval;
        let mut driver_shutdown = shutdown;
        let driver = tokio::spawn(async move {
            loop {
                if let Err(e) = adm.tick(&mut helper, runner.as_ref()).await {
                    // driver fault (not a handler failure): surface it
                    // as a failed workflow rather than spinning on it
                    warn!(error = %e, "driver fault");
                    helper.status = TaskPhase::Failed;
                    helper.message = e.to_string();
                }
                let terminal = helper.status.is_terminal();
                if snapshot_tx.send(helper.clone()).await.is_err() {
                    break;
                }
                if terminal {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    changed = driver_shutdown.changed() => {
                        if changed.is_err() || *driver_shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        while let Some(snapshot) = snapshot_rx.recv().await {
            self.publish_phase_events(&task_log, &snapshot);
            snapshot.apply_to(&mut task_log);
            match task_log.phase {
                TaskPhase::Success => {
                    self.finish(&mut cluster, &mut task_log, operation, true).await;
                    break;
                }
                TaskPhase::Failed => {
                    self.finish(&mut cluster, &mut task_log, operation, false).await;
                    break;
                }
                _ => {
                    if let Err(e) = self.store.save_task_log(&task_log).await {
                        warn!(
                            task_log = %task_log.id,
                            error = %e,
                            "persisting snapshot failed; store keeps the previous tick"
                        );
                    }
                }
            }
        }
        drop(snapshot_rx);
        let _ = driver.await;
        info!(cluster = %cluster.name, %operation, "workflow runtime exited");
    }

    /// Emit one event per detail newly closed since the last snapshot
    fn publish_phase_events(&self, previous: &TaskLog, snapshot: &TaskHelper) {
        for (index, detail) in snapshot.details.iter().enumerate() {
            if !detail.status.is_terminal() {
                continue;
            }
            let already_closed = previous
                .details
                .get(index)
                .map(|d| d.status.is_terminal())
                .unwrap_or(false);
            if !already_closed {
                self.events.publish(Event::PhaseCompleted {
                    cluster_id: snapshot.cluster_id,
                    phase: detail.task.clone(),
                    success: detail.status == TaskPhase::Success,
                });
            }
        }
    }

    async fn finish(
        &self,
        cluster: &mut Cluster,
        task_log: &mut TaskLog,
        operation: Operation,
        success: bool,
    ) {
        let message = task_log.message.clone();
        task_log.end(success, message.clone());
        if let Err(e) = self.store.save_task_log(task_log).await {
            // do not touch the cluster when the task log could not be
            // closed; recovery reconciles on the next start
            error!(task_log = %task_log.id, error = %e, "persisting terminal task log failed");
            return;
        }

        let mut content: HashMap<String, String> = HashMap::new();
        content.insert("detailName".to_string(), cluster.name.clone());
        if success {
            if let Some(status) = operation.success_status() {
                cluster.status = status;
            }
            cluster.message.clear();
            cluster.current_task_id = None;
            if operation == Operation::Upgrade {
                if let Some(version) = cluster.upgrade_version.take() {
                    cluster.version = version;
                }
            }
            if matches!(operation, Operation::Create | Operation::AddWorker) {
                self.promote_joined_nodes(cluster).await;
            }
            info!(cluster = %cluster.name, %operation, "workflow successful");
        } else {
            cluster.status = ResourceStatus::Failed;
            cluster.message = message.clone();
            content.insert("errMsg".to_string(), message);
            info!(cluster = %cluster.name, %operation, "workflow failed");
        }
        if let Err(e) = self.store.save_cluster(cluster).await {
            error!(cluster = %cluster.name, error = %e, "persisting cluster after workflow failed");
        }

        notify_best_effort(
            self.notifier.as_ref(),
            operation.as_str(),
            Scope::Cluster,
            cluster,
            success,
            content,
        )
        .await;
        self.events.publish(Event::TaskCompleted {
            cluster_id: cluster.id,
            operation,
            success,
        });
    }

    /// Nodes (and their hosts) that were still joining when the
    /// workflow succeeded are now cluster members
    async fn promote_joined_nodes(&self, cluster: &Cluster) {
        let nodes = match self.store.list_nodes(cluster.id).await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(cluster = %cluster.name, error = %e, "listing nodes after workflow failed");
                return;
            }
        };
        for mut node in nodes {
            if !node.status.is_transitional() {
                continue;
            }
            node.status = ResourceStatus::Running;
            node.message.clear();
            if let Err(e) = self.store.save_node(&node).await {
                warn!(node = %node.name, error = %e, "promoting node failed");
                continue;
            }
            if let Ok(Some(mut host)) = self.store.get_host(node.host_id).await {
                if host.status.is_transitional() {
                    host.status = ResourceStatus::Running;
                    host.message.clear();
                    if let Err(e) = self.store.save_host(&host).await {
                        warn!(host = %host.name, error = %e, "promoting host failed");
                    }
                }
            }
        }
    }
}
