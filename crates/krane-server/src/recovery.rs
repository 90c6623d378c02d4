//! Crash-recovery hook.
//!
//! The driver's execution loop lives only in process memory; a restart
//! loses the loop but leaves the store with a "running" snapshot that no
//! longer corresponds to reality. This hook runs once, synchronously,
//! before the supervisor or any surface accepts new work, and inside one
//! transaction forces everything non-stable to failed. A failure aborts
//! the whole transaction and must be treated as fatal by startup.

use anyhow::{Context, Result};
use krane_adm::TaskPhase;
use krane_common::ResourceStatus;
use krane_store::Store;
use tracing::info;

/// Fixed message stamped on every record the hook cancels
pub const TASK_CANCELLED: &str = "task cancelled";

/// Counts of records the hook force-failed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub clusters: u64,
    pub task_logs: u64,
    pub details: u64,
    pub hosts: u64,
    pub nodes: u64,
    pub provisioners: u64,
}

impl RecoveryReport {
    pub fn total(&self) -> u64 {
        self.clusters + self.task_logs + self.details + self.hosts + self.nodes + self.provisioners
    }
}

/// Reconcile every workflow left non-terminal by a previous process
/// instance. Expects a quiescent store.
pub async fn recover_cluster_tasks(store: &dyn Store) -> Result<RecoveryReport> {
    info!("reconciling workflow state left by previous process instance");

    let mut tx = store.begin().await.context("opening recovery transaction")?;
    let mut report = RecoveryReport::default();

    report.clusters = tx
        .fail_clusters_not_in(&ResourceStatus::STABLE, TASK_CANCELLED)
        .await
        .context("failing non-stable clusters")?;
    report.task_logs = tx
        .fail_task_logs_not_in(&TaskPhase::TERMINAL, TASK_CANCELLED)
        .await
        .context("failing non-terminal task logs")?;
    report.details = tx
        .fail_running_details(TASK_CANCELLED)
        .await
        .context("failing running task details")?;
    report.hosts = tx
        .fail_hosts_not_in(
            &[ResourceStatus::Running, ResourceStatus::Failed],
            TASK_CANCELLED,
        )
        .await
        .context("failing non-stable hosts")?;
    report.nodes = tx
        .fail_nodes_not_in(&ResourceStatus::STABLE, TASK_CANCELLED)
        .await
        .context("failing non-stable nodes")?;
    report.provisioners = tx
        .fail_provisioners_not_in(&ResourceStatus::STABLE, TASK_CANCELLED)
        .await
        .context("failing non-stable provisioners")?;

    tx.commit().await.context("committing recovery transaction")?;

    info!(
        clusters = report.clusters,
        task_logs = report.task_logs,
        details = report.details,
        hosts = report.hosts,
        nodes = report.nodes,
        provisioners = report.provisioners,
        "crash recovery complete"
    );
    Ok(report)
}
