//! Plugin phases: cluster storage, ingress controller, node problem
//! detector.

use crate::error::Result;
use crate::phase::{run_playbook, run_playbook_with_vars, Phase, PhaseContext};
use async_trait::async_trait;
use krane_common::{ProvisionerKind, ResourceStatus, StorageProvisioner};

const NPD_PLAYBOOK: &str = "12-npd.yml";
const INGRESS_PLAYBOOK: &str = "14-ingress-controller.yml";
const CLUSTER_STORAGE: &str = "10-plugin-cluster-storage.yml";
const ADD_WORKER_STORAGE: &str = "91-add-worker-09-storage.yml";
const ROOK_CEPH_STORAGE: &str = "10-plugin-cluster-storage-rook-ceph.yml";

pub struct NpdPhase;

#[async_trait]
impl Phase for NpdPhase {
    fn name(&self) -> &str {
        "Npd"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, NPD_PLAYBOOK, "").await
    }
}

pub struct IngressControllerPhase {
    pub controller_type: Option<String>,
}

#[async_trait]
impl Phase for IngressControllerPhase {
    fn name(&self) -> &str {
        "IngressController"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        match &self.controller_type {
            Some(kind) => {
                run_playbook_with_vars(
                    ctx,
                    INGRESS_PLAYBOOK,
                    "",
                    &[("ingress_controller_type", kind.as_str())],
                )
                .await
            }
            None => run_playbook(ctx, INGRESS_PLAYBOOK, "").await,
        }
    }
}

/// Which storage provisioners the storage playbook should enable.
/// Derived from the cluster's currently running provisioner records so a
/// scaled-out worker joins every storage backend its cluster carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageFlags {
    pub nfs: bool,
    pub nfs_version: String,
    pub gfs: bool,
    pub external_ceph_block: bool,
    pub external_cephfs: bool,
}

impl Default for StorageFlags {
    fn default() -> Self {
        Self {
            nfs: false,
            nfs_version: "v4".to_string(),
            gfs: false,
            external_ceph_block: false,
            external_cephfs: false,
        }
    }
}

impl StorageFlags {
    pub fn from_provisioners(provisioners: &[StorageProvisioner]) -> Self {
        let mut flags = Self::default();
        for p in provisioners {
            if p.status != ResourceStatus::Running {
                continue;
            }
            match p.kind {
                ProvisionerKind::Nfs => {
                    flags.nfs = true;
                    if let Some(version) = p
                        .vars
                        .get("storage_nfs_server_version")
                        .and_then(|v| v.as_str())
                    {
                        flags.nfs_version = version.to_string();
                    }
                }
                ProvisionerKind::Gfs => flags.gfs = true,
                ProvisionerKind::ExternalCephBlock => flags.external_ceph_block = true,
                ProvisionerKind::ExternalCephfs => flags.external_cephfs = true,
                // rook-ceph ships as its own phase
                ProvisionerKind::RookCeph => {}
            }
        }
        flags
    }

    fn toggle(enabled: bool) -> &'static str {
        if enabled {
            "enable"
        } else {
            "disable"
        }
    }
}

pub struct ClusterStoragePhase {
    pub add_worker: bool,
    pub flags: StorageFlags,
}

#[async_trait]
impl Phase for ClusterStoragePhase {
    fn name(&self) -> &str {
        "CreateClusterStorage"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let playbook = if self.add_worker {
            ADD_WORKER_STORAGE
        } else {
            CLUSTER_STORAGE
        };
        run_playbook_with_vars(
            ctx,
            playbook,
            "",
            &[
                ("enable_nfs_provisioner", StorageFlags::toggle(self.flags.nfs)),
                ("storage_nfs_server_version", self.flags.nfs_version.as_str()),
                ("enable_gfs_provisioner", StorageFlags::toggle(self.flags.gfs)),
                (
                    "enable_external_ceph_block_provisioner",
                    StorageFlags::toggle(self.flags.external_ceph_block),
                ),
                (
                    "enable_external_cephfs_provisioner",
                    StorageFlags::toggle(self.flags.external_cephfs),
                ),
            ],
        )
        .await
    }
}

pub struct RookCephStoragePhase {
    pub storage_path: Option<String>,
}

#[async_trait]
impl Phase for RookCephStoragePhase {
    fn name(&self) -> &str {
        "CreateRookCephStorage"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        let mut vars: Vec<(&str, &str)> = vec![("storage_rook_enabled", "true")];
        if let Some(path) = &self.storage_path {
            vars.push(("storage_rook_path", path.as_str()));
        }
        run_playbook_with_vars(ctx, ROOK_CEPH_STORAGE, "", &vars).await
    }
}
