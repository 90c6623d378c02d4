//! Preparation phases: base OS configuration through certificates.
//!
//! These run before any control-plane component and encode the real
//! ordering dependencies of a node: base system config, then container
//! runtime, then Kubernetes binaries, then the load balancer and certs.
//! Add-worker runs restricted variants of the same playbooks against the
//! new workers only.

use crate::error::Result;
use crate::phase::{run_playbook, Phase, PhaseContext};
use async_trait::async_trait;

const PREPARE_BASE: &str = "01-base.yml";
const PREPARE_ADD_WORKER_BASE: &str = "91-add-worker-01-base.yml";

const PREPARE_RUNTIME: &str = "02-runtime.yml";
const PREPARE_ADD_WORKER_RUNTIME: &str = "91-add-worker-02-runtime.yml";

const PREPARE_KUBERNETES_COMPONENT: &str = "03-kubernetes-component.yml";
const PREPARE_ADD_WORKER_KUBERNETES_COMPONENT: &str = "91-add-worker-03-kubernetes-component.yml";

const PREPARE_LOAD_BALANCER: &str = "04-load-balancer.yml";
const PREPARE_ADD_WORKER_LOAD_BALANCER: &str = "91-add-worker-04-load-balancer.yml";

const PREPARE_CERTIFICATES: &str = "05-certificates.yml";
const PREPARE_ADD_WORKER_CERTIFICATES: &str = "91-add-worker-05-certificates.yml";

pub struct BaseSystemConfigPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for BaseSystemConfigPhase {
    fn name(&self) -> &str {
        "BasicConfigSystem"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            PREPARE_ADD_WORKER_BASE
        } else {
            PREPARE_BASE
        };
        run_playbook(ctx, playbook, "").await
    }
}

pub struct ContainerRuntimePhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for ContainerRuntimePhase {
    fn name(&self) -> &str {
        "Install Container Runtime"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            PREPARE_ADD_WORKER_RUNTIME
        } else {
            PREPARE_RUNTIME
        };
        run_playbook(ctx, playbook, "").await
    }
}

pub struct KubernetesComponentPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for KubernetesComponentPhase {
    fn name(&self) -> &str {
        "Prepare Kubernetes Component"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            PREPARE_ADD_WORKER_KUBERNETES_COMPONENT
        } else {
            PREPARE_KUBERNETES_COMPONENT
        };
        run_playbook(ctx, playbook, "").await
    }
}

pub struct LoadBalancerPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for LoadBalancerPhase {
    fn name(&self) -> &str {
        "Install Load Balancer"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            PREPARE_ADD_WORKER_LOAD_BALANCER
        } else {
            PREPARE_LOAD_BALANCER
        };
        run_playbook(ctx, playbook, "").await
    }
}

pub struct CertificatesPhase {
    pub add_worker: bool,
}

#[async_trait]
impl Phase for CertificatesPhase {
    fn name(&self) -> &str {
        "GenerateCertificates"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            PREPARE_ADD_WORKER_CERTIFICATES
        } else {
            PREPARE_CERTIFICATES
        };
        run_playbook(ctx, playbook, "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krane_runner::{InventoryVars, LogSink, ScriptedRunner};

    #[tokio::test]
    async fn test_add_worker_variants_pick_restricted_playbooks() {
        let runner = ScriptedRunner::new();
        let inventory = InventoryVars::new();
        let sink = LogSink::discard();
        let ctx = PhaseContext {
            runner: &runner,
            inventory: &inventory,
            sink: &sink,
        };

        BaseSystemConfigPhase { add_worker: false }
            .run(&ctx)
            .await
            .unwrap();
        BaseSystemConfigPhase { add_worker: true }
            .run(&ctx)
            .await
            .unwrap();
        CertificatesPhase { add_worker: true }
            .run(&ctx)
            .await
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "01-base.yml",
                "91-add-worker-01-base.yml",
                "91-add-worker-05-certificates.yml",
            ]
        );
    }
}
