//! In-memory reference store.
//!
//! Backs tests and the demo server. The transaction works on a snapshot
//! of the whole data set and swaps it back on commit; recovery is the
//! only transaction user and runs against a quiescent store, so the
//! snapshot swap is equivalent to a serialized transaction.

use crate::error::Result;
use crate::store::{Store, StoreTx};
use async_trait::async_trait;
use chrono::Utc;
use krane_adm::{TaskLog, TaskPhase, TaskRetryLog};
use krane_common::{Cluster, ClusterNode, Host, ResourceStatus, StorageProvisioner};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct StoreData {
    clusters: HashMap<Uuid, Cluster>,
    hosts: HashMap<Uuid, Host>,
    nodes: HashMap<Uuid, ClusterNode>,
    provisioners: HashMap<Uuid, StorageProvisioner>,
    task_logs: HashMap<Uuid, TaskLog>,
    retry_logs: Vec<TaskRetryLog>,
}

/// In-memory store for tests and demo mode
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_cluster(&self, cluster: &Cluster) -> Result<()> {
        let mut cluster = cluster.clone();
        cluster.updated_at = Utc::now();
        self.inner
            .write()
            .unwrap()
            .clusters
            .insert(cluster.id, cluster);
        Ok(())
    }

    async fn get_cluster(&self, id: Uuid) -> Result<Option<Cluster>> {
        Ok(self.inner.read().unwrap().clusters.get(&id).cloned())
    }

    async fn get_cluster_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .clusters
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let mut clusters: Vec<Cluster> =
            self.inner.read().unwrap().clusters.values().cloned().collect();
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    async fn save_host(&self, host: &Host) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .hosts
            .insert(host.id, host.clone());
        Ok(())
    }

    async fn get_host(&self, id: Uuid) -> Result<Option<Host>> {
        Ok(self.inner.read().unwrap().hosts.get(&id).cloned())
    }

    async fn get_host_by_name(&self, name: &str) -> Result<Option<Host>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .hosts
            .values()
            .find(|h| h.name == name)
            .cloned())
    }

    async fn list_hosts(&self) -> Result<Vec<Host>> {
        let mut hosts: Vec<Host> = self.inner.read().unwrap().hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hosts)
    }

    async fn save_node(&self, node: &ClusterNode) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .nodes
            .insert(node.id, node.clone());
        Ok(())
    }

    async fn list_nodes(&self, cluster_id: Uuid) -> Result<Vec<ClusterNode>> {
        let mut nodes: Vec<ClusterNode> = self
            .inner
            .read()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.cluster_id == cluster_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    async fn save_provisioner(&self, provisioner: &StorageProvisioner) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .provisioners
            .insert(provisioner.id, provisioner.clone());
        Ok(())
    }

    async fn list_provisioners(&self, cluster_id: Uuid) -> Result<Vec<StorageProvisioner>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .provisioners
            .values()
            .filter(|p| p.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn save_task_log(&self, task_log: &TaskLog) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .task_logs
            .insert(task_log.id, task_log.clone());
        Ok(())
    }

    async fn get_task_log(&self, id: Uuid) -> Result<Option<TaskLog>> {
        Ok(self.inner.read().unwrap().task_logs.get(&id).cloned())
    }

    async fn list_task_logs(&self, cluster_id: Uuid) -> Result<Vec<TaskLog>> {
        let mut task_logs: Vec<TaskLog> = self
            .inner
            .read()
            .unwrap()
            .task_logs
            .values()
            .filter(|t| t.cluster_id == cluster_id)
            .cloned()
            .collect();
        task_logs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(task_logs)
    }

    async fn append_retry_log(&self, retry: &TaskRetryLog) -> Result<()> {
        self.inner.write().unwrap().retry_logs.push(retry.clone());
        Ok(())
    }

    async fn list_retry_logs(&self, task_log_id: Uuid) -> Result<Vec<TaskRetryLog>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .retry_logs
            .iter()
            .filter(|r| r.task_log_id == task_log_id)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let data = self.inner.read().unwrap().clone();
        Ok(Box::new(MemoryTx {
            data,
            origin: self.inner.clone(),
        }))
    }
}

/// Snapshot transaction over [`MemoryStore`]
struct MemoryTx {
    data: StoreData,
    origin: Arc<RwLock<StoreData>>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn fail_clusters_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64> {
        let mut touched = 0;
        for cluster in self.data.clusters.values_mut() {
            if !stable.contains(&cluster.status) {
                cluster.status = ResourceStatus::Failed;
                cluster.message = message.to_string();
                cluster.updated_at = Utc::now();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn fail_task_logs_not_in(
        &mut self,
        terminal: &[TaskPhase],
        message: &str,
    ) -> Result<u64> {
        let now = Utc::now();
        let mut touched = 0;
        for task_log in self.data.task_logs.values_mut() {
            if !terminal.contains(&task_log.phase) {
                task_log.phase = TaskPhase::Failed;
                task_log.message = message.to_string();
                task_log.end_time = Some(now);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn fail_running_details(&mut self, message: &str) -> Result<u64> {
        let now = Utc::now();
        let mut touched = 0;
        for task_log in self.data.task_logs.values_mut() {
            for detail in &mut task_log.details {
                if detail.status == TaskPhase::Running {
                    detail.status = TaskPhase::Failed;
                    detail.message = message.to_string();
                    detail.end_time = Some(now);
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn fail_hosts_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64> {
        let mut touched = 0;
        for host in self.data.hosts.values_mut() {
            if !stable.contains(&host.status) {
                host.status = ResourceStatus::Failed;
                host.message = message.to_string();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn fail_nodes_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64> {
        let mut touched = 0;
        for node in self.data.nodes.values_mut() {
            if !stable.contains(&node.status) {
                node.status = ResourceStatus::Failed;
                node.message = message.to_string();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn fail_provisioners_not_in(
        &mut self,
        stable: &[ResourceStatus],
        message: &str,
    ) -> Result<u64> {
        let mut touched = 0;
        for provisioner in self.data.provisioners.values_mut() {
            if !stable.contains(&provisioner.status) {
                provisioner.status = ResourceStatus::Failed;
                provisioner.message = message.to_string();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        *self.origin.write().unwrap() = self.data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krane_adm::{Operation, TaskLogDetail};
    use krane_common::Provider;

    fn cluster(name: &str, status: ResourceStatus) -> Cluster {
        let mut c = Cluster::new(name, "v1.28.4", Provider::BareMetal);
        c.status = status;
        c
    }

    #[tokio::test]
    async fn test_cluster_round_trip() {
        let store = MemoryStore::new();
        let c = cluster("demo", ResourceStatus::Running);
        store.save_cluster(&c).await.unwrap();

        let by_id = store.get_cluster(c.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "demo");
        let by_name = store.get_cluster_by_name("demo").await.unwrap().unwrap();
        assert_eq!(by_name.id, c.id);
        assert!(store.get_cluster_by_name("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_log_listing_newest_first() {
        let store = MemoryStore::new();
        let cluster_id = Uuid::new_v4();
        let older = TaskLog::new(cluster_id, Operation::Create);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let newer = TaskLog::new(cluster_id, Operation::Backup);
        store.save_task_log(&older).await.unwrap();
        store.save_task_log(&newer).await.unwrap();
        // unrelated cluster's log must not appear
        store
            .save_task_log(&TaskLog::new(Uuid::new_v4(), Operation::Reset))
            .await
            .unwrap();

        let logs = store.list_task_logs(cluster_id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, newer.id);
        assert_eq!(logs[1].id, older.id);
    }

    #[tokio::test]
    async fn test_is_task_on() {
        let store = MemoryStore::new();

        // unknown cluster reads busy
        assert!(store.is_task_on("ghost").await.unwrap());

        let mut c = cluster("demo", ResourceStatus::Running);
        store.save_cluster(&c).await.unwrap();
        assert!(!store.is_task_on("demo").await.unwrap());

        let mut task_log = TaskLog::new(c.id, Operation::Upgrade);
        task_log.phase = TaskPhase::Running;
        store.save_task_log(&task_log).await.unwrap();
        c.current_task_id = Some(task_log.id);
        store.save_cluster(&c).await.unwrap();
        assert!(store.is_task_on("demo").await.unwrap());

        task_log.phase = TaskPhase::Failed;
        store.save_task_log(&task_log).await.unwrap();
        assert!(!store.is_task_on("demo").await.unwrap());
    }

    #[tokio::test]
    async fn test_tx_commit_applies_all_updates() {
        let store = MemoryStore::new();
        store
            .save_cluster(&cluster("busy", ResourceStatus::Upgrading))
            .await
            .unwrap();
        store
            .save_cluster(&cluster("idle", ResourceStatus::Running))
            .await
            .unwrap();

        let mut task_log = TaskLog::new(Uuid::new_v4(), Operation::Upgrade);
        task_log.phase = TaskPhase::Running;
        task_log.details.push(TaskLogDetail::start(
            task_log.id,
            task_log.cluster_id,
            "upgradeCluster",
        ));
        store.save_task_log(&task_log).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.fail_clusters_not_in(&ResourceStatus::STABLE, "task cancelled")
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            tx.fail_task_logs_not_in(&TaskPhase::TERMINAL, "task cancelled")
                .await
                .unwrap(),
            1
        );
        assert_eq!(tx.fail_running_details("task cancelled").await.unwrap(), 1);
        tx.commit().await.unwrap();

        let busy = store.get_cluster_by_name("busy").await.unwrap().unwrap();
        assert_eq!(busy.status, ResourceStatus::Failed);
        assert_eq!(busy.message, "task cancelled");
        let idle = store.get_cluster_by_name("idle").await.unwrap().unwrap();
        assert_eq!(idle.status, ResourceStatus::Running);

        let stored = store.get_task_log(task_log.id).await.unwrap().unwrap();
        assert_eq!(stored.phase, TaskPhase::Failed);
        assert!(stored.end_time.is_some());
        assert_eq!(stored.details[0].status, TaskPhase::Failed);
    }

    #[tokio::test]
    async fn test_tx_drop_rolls_back() {
        let store = MemoryStore::new();
        store
            .save_cluster(&cluster("busy", ResourceStatus::Upgrading))
            .await
            .unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.fail_clusters_not_in(&ResourceStatus::STABLE, "task cancelled")
                .await
                .unwrap();
            // dropped without commit
        }

        let busy = store.get_cluster_by_name("busy").await.unwrap().unwrap();
        assert_eq!(busy.status, ResourceStatus::Upgrading);
        assert!(busy.message.is_empty());
    }

    #[tokio::test]
    async fn test_retry_logs_append_only() {
        let store = MemoryStore::new();
        let task_log_id = Uuid::new_v4();
        for message in ["first failure", "second failure"] {
            store
                .append_retry_log(&TaskRetryLog {
                    id: Uuid::new_v4(),
                    cluster_id: Uuid::new_v4(),
                    task_log_id,
                    message: message.to_string(),
                    last_failed_time: Utc::now(),
                    restart_time: Utc::now(),
                })
                .await
                .unwrap();
        }

        let retries = store.list_retry_logs(task_log_id).await.unwrap();
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].message, "first failure");
    }
}
