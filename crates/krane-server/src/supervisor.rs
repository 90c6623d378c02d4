//! Workflow supervisor.
//!
//! One supervised background task per active cluster workflow, tracked
//! by cluster id. Acquiring a slot is the process-local mutual-exclusion
//! point: two concurrent start/resume requests for the same cluster race
//! here and exactly one wins. Shutdown flips a watch signal every
//! workflow observes, then joins the remaining tasks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

enum SlotState {
    /// Reserved by `try_acquire`, not yet spawned
    Reserved,
    Running(JoinHandle<()>),
}

/// Process-wide registry of running workflow tasks
pub struct Supervisor {
    workflows: Mutex<HashMap<Uuid, SlotState>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new() -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            workflows: Mutex::new(HashMap::new()),
            shutdown_tx,
        })
    }

    /// Signal observed by every workflow task
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Reserve the cluster's workflow slot. Returns `None` while another
    /// workflow for the same cluster is reserved or still running.
    pub fn try_acquire(self: &Arc<Self>, cluster_id: Uuid) -> Option<WorkflowSlot> {
        let mut workflows = self.workflows.lock().unwrap();
        if let Some(state) = workflows.get(&cluster_id) {
            match state {
                SlotState::Reserved => return None,
                SlotState::Running(handle) if !handle.is_finished() => return None,
                // finished task that has not reaped itself yet
                SlotState::Running(_) => {}
            }
        }
        workflows.insert(cluster_id, SlotState::Reserved);
        Some(WorkflowSlot {
            supervisor: self.clone(),
            cluster_id,
            armed: true,
        })
    }

    pub fn is_running(&self, cluster_id: Uuid) -> bool {
        self.workflows.lock().unwrap().contains_key(&cluster_id)
    }

    pub fn running_count(&self) -> usize {
        self.workflows.lock().unwrap().len()
    }

    fn release(&self, cluster_id: Uuid) {
        self.workflows.lock().unwrap().remove(&cluster_id);
    }

    /// Stop accepting work, signal every workflow and join them
    pub async fn shutdown(&self) {
        info!("supervisor shutting down, signalling workflows");
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = {
            let mut workflows = self.workflows.lock().unwrap();
            workflows
                .drain()
                .filter_map(|(_, state)| match state {
                    SlotState::Running(handle) => Some(handle),
                    SlotState::Reserved => None,
                })
                .collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("supervisor shutdown complete");
    }
}

/// A reserved workflow slot. Spawn the workflow into it, or drop it to
/// release the reservation (e.g. when persistence fails after the slot
/// was taken).
pub struct WorkflowSlot {
    supervisor: Arc<Supervisor>,
    cluster_id: Uuid,
    armed: bool,
}

impl WorkflowSlot {
    /// Spawn the workflow future; the slot is released when it finishes
    pub fn spawn<F>(mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.armed = false;
        let supervisor = self.supervisor.clone();
        let cluster_id = self.cluster_id;
        let handle = tokio::spawn(async move {
            future.await;
            debug!(cluster = %cluster_id, "workflow task finished, releasing slot");
            supervisor.release(cluster_id);
        });
        self.supervisor
            .workflows
            .lock()
            .unwrap()
            .insert(cluster_id, SlotState::Running(handle));
    }
}

impl Drop for WorkflowSlot {
    fn drop(&mut self) {
        if self.armed {
            self.supervisor.release(self.cluster_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_slot_is_exclusive_per_cluster() {
        let supervisor = Supervisor::new();
        let cluster_id = Uuid::new_v4();

        let slot = supervisor.try_acquire(cluster_id).unwrap();
        assert!(supervisor.try_acquire(cluster_id).is_none());
        // a different cluster is unaffected
        assert!(supervisor.try_acquire(Uuid::new_v4()).is_some());
        drop(slot);
    }

    #[tokio::test]
    async fn test_dropped_slot_releases_reservation() {
        let supervisor = Supervisor::new();
        let cluster_id = Uuid::new_v4();

        let slot = supervisor.try_acquire(cluster_id).unwrap();
        drop(slot);
        assert!(supervisor.try_acquire(cluster_id).is_some());
    }

    #[tokio::test]
    async fn test_slot_released_after_workflow_finishes() {
        let supervisor = Supervisor::new();
        let cluster_id = Uuid::new_v4();

        let slot = supervisor.try_acquire(cluster_id).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        slot.spawn(async move {
            let _ = rx.await;
        });

        assert!(supervisor.try_acquire(cluster_id).is_none());
        tx.send(()).unwrap();

        // wait for the task to reap itself
        for _ in 0..100 {
            if !supervisor.is_running(cluster_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(supervisor.try_acquire(cluster_id).is_some());
    }

    #[tokio::test]
    async fn test_shutdown_signals_and_joins() {
        let supervisor = Supervisor::new();
        let cluster_id = Uuid::new_v4();

        let slot = supervisor.try_acquire(cluster_id).unwrap();
        let mut shutdown = supervisor.shutdown_signal();
        slot.spawn(async move {
            loop {
                if shutdown.changed().await.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        });

        supervisor.shutdown().await;
        assert_eq!(supervisor.running_count(), 0);
    }
}
