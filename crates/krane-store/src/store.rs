//! Store trait definition.
//!
//! Implementations can use any transactional backend; krane ships only
//! the in-memory reference implementation. All saves are upserts keyed
//! by record id, and a task log is saved together with its details.

use crate::error::Result;
use async_trait::async_trait;
use krane_adm::{TaskLog, TaskPhase, TaskRetryLog};
use krane_common::{Cluster, ClusterNode, Host, ResourceStatus, StorageProvisioner};
use uuid::Uuid;

/// Trait for krane persistence
#[async_trait]
pub trait Store: Send + Sync {
    // -- clusters --

    async fn save_cluster(&self, cluster: &Cluster) -> Result<()>;
    async fn get_cluster(&self, id: Uuid) -> Result<Option<Cluster>>;
    async fn get_cluster_by_name(&self, name: &str) -> Result<Option<Cluster>>;
    async fn list_clusters(&self) -> Result<Vec<Cluster>>;

    // -- hosts --

    async fn save_host(&self, host: &Host) -> Result<()>;
    async fn get_host(&self, id: Uuid) -> Result<Option<Host>>;
    async fn get_host_by_name(&self, name: &str) -> Result<Option<Host>>;
    async fn list_hosts(&self) -> Result<Vec<Host>>;

    // -- cluster nodes --

    async fn save_node(&self, node: &ClusterNode) -> Result<()>;
    async fn list_nodes(&self, cluster_id: Uuid) -> Result<Vec<ClusterNode>>;

    // -- storage provisioners --

    async fn save_provisioner(&self, provisioner: &StorageProvisioner) -> Result<()>;
    async fn list_provisioners(&self, cluster_id: Uuid) -> Result<Vec<StorageProvisioner>>;

    // -- task logs --

    /// Upsert a task log together with its details
    async fn save_task_log(&self, task_log: &TaskLog) -> Result<()>;
    async fn get_task_log(&self, id: Uuid) -> Result<Option<TaskLog>>;
    /// Task logs for one cluster, newest first
    async fn list_task_logs(&self, cluster_id: Uuid) -> Result<Vec<TaskLog>>;

    // -- retry logs (append-only) --

    async fn append_retry_log(&self, retry: &TaskRetryLog) -> Result<()>;
    async fn list_retry_logs(&self, task_log_id: Uuid) -> Result<Vec<TaskRetryLog>>;

    /// Open the all-or-nothing multi-write used by crash recovery.
    /// Dropping the transaction without committing discards every
    /// update.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Whether a workflow is currently active for the cluster: its
    /// current-task pointer references a task log whose phase is not
    /// terminal. An unknown cluster name reads as busy so callers cannot
    /// race a half-created record.
    async fn is_task_on(&self, cluster_name: &str) -> Result<bool> {
        let Some(cluster) = self.get_cluster_by_name(cluster_name).await? else {
            return Ok(true);
        };
        let Some(task_id) = cluster.current_task_id else {
            return Ok(false);
        };
        match self.get_task_log(task_id).await? {
            Some(task_log) => Ok(!task_log.is_terminal()),
            None => Ok(false),
        }
    }
}

/// One transactional multi-write. The methods mirror the bulk updates
/// crash recovery performs; timestamps are stamped by the transaction at
/// execution time. Each returns the number of records it touched.
#[async_trait]
pub trait StoreTx: Send {
    async fn fail_clusters_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64>;

    async fn fail_task_logs_not_in(
        &mut self,
        terminal: &[TaskPhase],
        message: &str,
    ) -> Result<u64>;

    async fn fail_running_details(&mut self, message: &str) -> Result<u64>;

    async fn fail_hosts_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64>;

    async fn fail_nodes_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64>;

    async fn fail_provisioners_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64>;

    /// Make every update visible atomically
    async fn commit(self: Box<Self>) -> Result<()>;
}
