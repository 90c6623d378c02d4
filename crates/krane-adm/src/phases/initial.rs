//! Control-plane and node initialization phases.

use crate::error::Result;
use crate::phase::{run_playbook, Phase, PhaseContext};
use async_trait::async_trait;

const INIT_ETCD: &str = "06-etcd.yml";
const INIT_MASTER: &str = "07-kubernetes-master.yml";
const INIT_WORKER: &str = "08-kubernetes-worker.yml";
const INIT_ADD_WORKER_WORKER: &str = "91-add-worker-06-kubernetes-worker.yml";
const INIT_NETWORK: &str = "09-plugin-network.yml";
const INIT_ADD_WORKER_NETWORK: &str = "91-add-worker-07-network.yml";
const INIT_HELM: &str = "11-helm-install.yml";
const INIT_METRICS_SERVER: &str = "13-metrics-server.yml";
const INIT_POST: &str = "90-init-post.yml";
const INIT_ADD_WORKER_POST: &str = "91-add-worker-08-post.yml";

pub struct EtcdPhase {
    /// Run the etcd playbook in upgrade mode (tagged subset)
    pub upgrade: bool,
}

#[async_trait]
impl Phase for EtcdPhase {
    fn name(&self) -> &str {
        "InitEtcd"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let tag = if self.upgrade { "upgrade" } else { "" };
        run_playbook(ctx, INIT_ETCD, tag).await
    }
}

pub struct MasterPhase;

#[async_trait]
impl Phase for MasterPhase {
    fn name(&self) -> &str {
        "InitMaster"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, INIT_MASTER, "").await
    }
}

pub struct WorkerPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for WorkerPhase {
    fn name(&self) -> &str {
        "InitWorker"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            INIT_ADD_WORKER_WORKER
        } else {
            INIT_WORKER
        };
        run_playbook(ctx, playbook, "").await
    }
}

pub struct NetworkPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for NetworkPhase {
    fn name(&self) -> &str {
        "InitNetwork"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            INIT_ADD_WORKER_NETWORK
        } else {
            INIT_NETWORK
        };
        run_playbook(ctx, playbook, "").await
    }
}

pub struct HelmPhase;

#[async_trait]
impl Phase for HelmPhase {
    fn name(&self) -> &str {
        "InitHelm"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, INIT_HELM, "").await
    }
}

pub struct MetricsServerPhase;

#[async_trait]
impl Phase for MetricsServerPhase {
    fn name(&self) -> &str {
        "InitMetricsServer"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, INIT_METRICS_SERVER, "").await
    }
}

pub struct PostInitPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for PostInitPhase {
    fn name(&self) -> &str {
        "Post Init"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            INIT_ADD_WORKER_POST
        } else {
            INIT_POST
        };
        run_playbook(ctx, playbook, "").await
    }
}
