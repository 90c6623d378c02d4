//! Cluster lifecycle entry points.
//!
//! Each public operation validates the cluster, resolves resume-or-new
//! for the task log, reserves the cluster's workflow slot, snapshots the
//! inventory, and hands the workflow to its per-cluster runtime task.
//! The slot reservation is what makes two concurrent start/resume
//! requests for one cluster settle to exactly one winner.

use crate::events::EventManager;
use crate::notify::Notifier;
use crate::runtime::WorkflowRuntime;
use crate::supervisor::{Supervisor, WorkflowSlot};
use krane_adm::{
    resume as reopen_task, AdmError, ChainParams, ClusterAdm, Operation, TaskHelper, TaskLog,
    TaskPhase,
};
use krane_adm::phases::plugin::StorageFlags;
use krane_common::{Cluster, ClusterNode, NodeRole, ResourceStatus};
use krane_runner::{InventoryVars, LogStore, Runner, RunnerError};
use krane_store::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Error type for lifecycle operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error("cluster '{cluster}' status '{status}' does not allow {operation}")]
    InvalidClusterStatus {
        cluster: String,
        status: ResourceStatus,
        operation: Operation,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cluster '{0}' has no task log to resume")]
    NothingToResume(String),

    #[error(transparent)]
    Adm(#[from] AdmError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Options for the create workflow
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub ingress_controller_type: Option<String>,
    pub rook_ceph: bool,
    pub rook_ceph_path: Option<String>,
}

/// Lifecycle service over one store/runner pair
pub struct ClusterService {
    store: Arc<dyn Store>,
    runner: Arc<dyn Runner>,
    log_store: LogStore,
    supervisor: Arc<Supervisor>,
    runtime: WorkflowRuntime,
}

impl ClusterService {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<dyn Runner>,
        notifier: Arc<dyn Notifier>,
        events: EventManager,
        log_store: LogStore,
        supervisor: Arc<Supervisor>,
        poll_interval: Duration,
    ) -> Self {
        let runtime = WorkflowRuntime {
            store: store.clone(),
            notifier,
            events,
            poll_interval,
        };
        Self {
            store,
            runner,
            log_store,
            supervisor,
            runtime,
        }
    }

    /// Provision a new cluster onto its imported hosts
    pub async fn create(&self, cluster_name: &str, options: CreateOptions) -> Result<Uuid> {
        let cluster = self
            .cluster_in(
                cluster_name,
                Operation::Create,
                &[ResourceStatus::NotReady, ResourceStatus::Failed],
            )
            .await?;
        let params = ChainParams {
            ingress_controller_type: options.ingress_controller_type,
            rook_ceph: options.rook_ceph,
            rook_ceph_path: options.rook_ceph_path,
            ..Default::default()
        };
        self.launch(cluster, Operation::Create, params).await
    }

    /// Scale out: join the named hosts as workers
    pub async fn add_worker(&self, cluster_name: &str, workers: &[String]) -> Result<Uuid> {
        if workers.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "no worker hosts given".to_string(),
            ));
        }
        let cluster = self
            .cluster_in(
                cluster_name,
                Operation::AddWorker,
                &[ResourceStatus::Running, ResourceStatus::Failed],
            )
            .await?;

        for name in workers {
            let mut host = self
                .store
                .get_host_by_name(name)
                .await?
                .ok_or_else(|| ServiceError::HostNotFound(name.clone()))?;
            host.cluster_id = Some(cluster.id);
            host.status = ResourceStatus::Initializing;
            self.store.save_host(&host).await?;

            let nodes = self.store.list_nodes(cluster.id).await?;
            if !nodes.iter().any(|n| n.name == *name) {
                let node = ClusterNode::new(cluster.id, host.id, name, NodeRole::Worker);
                self.store.save_node(&node).await?;
            }
        }

        let params = self.chain_params_for(&cluster, Operation::AddWorker).await?;
        self.launch(cluster, Operation::AddWorker, params).await
    }

    /// Upgrade the cluster to `version`
    pub async fn upgrade(&self, cluster_name: &str, version: &str) -> Result<Uuid> {
        if version.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "no target version given".to_string(),
            ));
        }
        let mut cluster = self
            .cluster_in(
                cluster_name,
                Operation::Upgrade,
                &[ResourceStatus::Running, ResourceStatus::Failed],
            )
            .await?;
        cluster.upgrade_version = Some(version.to_string());
        let params = ChainParams {
            upgrade_version: Some(version.to_string()),
            ..Default::default()
        };
        self.launch(cluster, Operation::Upgrade, params).await
    }

    /// Return every host to its pre-install state
    pub async fn reset(&self, cluster_name: &str) -> Result<Uuid> {
        let cluster = self
            .cluster_in(
                cluster_name,
                Operation::Reset,
                &[
                    ResourceStatus::Running,
                    ResourceStatus::Failed,
                    ResourceStatus::NotReady,
                ],
            )
            .await?;
        self.launch(cluster, Operation::Reset, ChainParams::default())
            .await
    }

    /// Snapshot etcd and cluster state
    pub async fn backup(&self, cluster_name: &str) -> Result<Uuid> {
        let cluster = self
            .cluster_in(
                cluster_name,
                Operation::Backup,
                &[ResourceStatus::Running],
            )
            .await?;
        self.launch(cluster, Operation::Backup, ChainParams::default())
            .await
    }

    /// Restore the latest backup and restart control-plane components
    pub async fn restore(&self, cluster_name: &str) -> Result<Uuid> {
        let cluster = self
            .cluster_in(
                cluster_name,
                Operation::Restore,
                &[ResourceStatus::Running, ResourceStatus::Failed],
            )
            .await?;
        self.launch(cluster, Operation::Restore, ChainParams::default())
            .await
    }

    /// Operator-driven retry-from-failure: continue the stored task log
    /// from its failed phase without re-running completed phases.
    pub async fn resume(&self, cluster_name: &str, operation: Operation) -> Result<Uuid> {
        let cluster = self
            .store
            .get_cluster_by_name(cluster_name)
            .await?
            .ok_or_else(|| ServiceError::ClusterNotFound(cluster_name.to_string()))?;
        let stored = match cluster.current_task_id {
            Some(task_id) => self.store.get_task_log(task_id).await?,
            None => None,
        }
        .ok_or_else(|| ServiceError::NothingToResume(cluster_name.to_string()))?;

        let slot = self
            .supervisor
            .try_acquire(cluster.id)
            .ok_or(AdmError::TaskInExecution)?;
        let active = self.store.is_task_on(&cluster.name).await?;
        let outcome = reopen_task(stored, operation, active)?;
        for retry in &outcome.retry_logs {
            self.store.append_retry_log(retry).await?;
        }
        self.store.save_task_log(&outcome.task_log).await?;

        let params = self.chain_params_for(&cluster, operation).await?;
        self.ignite(slot, cluster, outcome.task_log, operation, params)
            .await
    }

    /// Fetch the cluster and check the operation is allowed from its
    /// current status
    async fn cluster_in(
        &self,
        cluster_name: &str,
        operation: Operation,
        allowed: &[ResourceStatus],
    ) -> Result<Cluster> {
        let cluster = self
            .store
            .get_cluster_by_name(cluster_name)
            .await?
            .ok_or_else(|| ServiceError::ClusterNotFound(cluster_name.to_string()))?;
        if !allowed.contains(&cluster.status) {
            return Err(ServiceError::InvalidClusterStatus {
                cluster: cluster.name,
                status: cluster.status,
                operation,
            });
        }
        Ok(cluster)
    }

    /// Reconstruct chain parameters from persisted cluster state, used
    /// by resumes and by operations whose parameters derive from records
    async fn chain_params_for(
        &self,
        cluster: &Cluster,
        operation: Operation,
    ) -> Result<ChainParams> {
        let mut params = ChainParams::default();
        match operation {
            Operation::Upgrade => {
                params.upgrade_version = cluster.upgrade_version.clone();
            }
            Operation::AddWorker => {
                let provisioners = self.store.list_provisioners(cluster.id).await?;
                params.storage = StorageFlags::from_provisioners(&provisioners);
            }
            _ => {}
        }
        Ok(params)
    }

    /// Resume the stored failed task when it matches the requested
    /// operation, otherwise open a fresh task log
    async fn launch(
        &self,
        cluster: Cluster,
        operation: Operation,
        params: ChainParams,
    ) -> Result<Uuid> {
        let stored = match cluster.current_task_id {
            Some(task_id) => self.store.get_task_log(task_id).await?,
            None => None,
        };

        let slot = self
            .supervisor
            .try_acquire(cluster.id)
            .ok_or(AdmError::TaskInExecution)?;

        let task_log = match stored {
            Some(log) if log.phase == TaskPhase::Failed && log.operation == operation => {
                debug!(cluster = %cluster.name, %operation, "continuing failed task log");
                let active = self.store.is_task_on(&cluster.name).await?;
                let outcome = reopen_task(log, operation, active)?;
                for retry in &outcome.retry_logs {
                    self.store.append_retry_log(retry).await?;
                }
                self.store.save_task_log(&outcome.task_log).await?;
                outcome.task_log
            }
            _ => {
                if self.store.is_task_on(&cluster.name).await? {
                    return Err(AdmError::TaskInExecution.into());
                }
                let task_log = TaskLog::new(cluster.id, operation);
                self.store.save_task_log(&task_log).await?;
                task_log
            }
        };

        self.ignite(slot, cluster, task_log, operation, params).await
    }

    /// Final common leg: log sink, cluster transition, inventory
    /// snapshot, spawn
    async fn ignite(
        &self,
        slot: WorkflowSlot,
        mut cluster: Cluster,
        task_log: TaskLog,
        operation: Operation,
        params: ChainParams,
    ) -> Result<Uuid> {
        let sink = self.log_store.create(&cluster.name, task_log.id)?;

        cluster.current_task_id = Some(task_log.id);
        if let Some(status) = operation.transition_status() {
            cluster.status = status;
        }
        self.store.save_cluster(&cluster).await?;

        let inventory = self.build_inventory(&cluster).await?;
        let adm = ClusterAdm::new(operation, &params);
        let helper = TaskHelper::new(&task_log, inventory, sink);
        let task_id = task_log.id;

        info!(cluster = %cluster.name, %operation, task_log = %task_id, "launching workflow");
        let runtime = self.runtime.clone();
        let runner = self.runner.clone();
        let shutdown = self.supervisor.shutdown_signal();
        slot.spawn(async move {
            runtime
                .run(runner, cluster, task_log, adm, helper, shutdown)
                .await;
        });
        Ok(task_id)
    }

    /// Snapshot the cluster's node inventory. Nodes still in a
    /// transitional status are the ones an add-worker run is joining and
    /// land in the `new-worker` group as well.
    async fn build_inventory(&self, cluster: &Cluster) -> Result<InventoryVars> {
        let mut inventory = InventoryVars::new();
        inventory.set_var("cluster_name", &cluster.name);
        inventory.set_var("kube_version", &cluster.version);

        for node in self.store.list_nodes(cluster.id).await? {
            inventory.add_host(node.role.as_str(), &node.name);
            if node.status.is_transitional() {
                inventory.add_host("new-worker", &node.name);
            }
        }
        Ok(inventory)
    }
}
