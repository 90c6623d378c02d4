//! Cluster backup and restore phases.

use crate::error::Result;
use crate::phase::{run_playbook, Phase, PhaseContext};
use async_trait::async_trait;

const BACKUP_CLUSTER: &str = "94-backup-cluster.yml";
const RESTORE_CLUSTER: &str = "95-restore-cluster.yml";
const RESTART_CLUSTER: &str = "96-restart-cluster.yml";

pub struct BackupClusterPhase;

#[async_trait]
impl Phase for BackupClusterPhase {
    fn name(&self) -> &str {
        "backupCluster"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, BACKUP_CLUSTER, "").await
    }
}

pub struct RestoreClusterPhase;

#[async_trait]
impl Phase for RestoreClusterPhase {
    fn name(&self) -> &str {
        "restoreCluster"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, RESTORE_CLUSTER, "").await
    }
}

/// Bounce control-plane components after a restore so they pick up the
/// restored etcd snapshot
pub struct RestartClusterPhase;

#[async_trait]
impl Phase for RestartClusterPhase {
    fn name(&self) -> &str {
        "restartCluster"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, RESTART_CLUSTER, "").await
    }
}
