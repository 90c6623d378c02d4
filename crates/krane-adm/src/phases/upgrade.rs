//! Cluster version upgrade phase.

use crate::error::Result;
use crate::phase::{run_playbook_with_vars, Phase, PhaseContext};
use async_trait::async_trait;

const UPGRADE_CLUSTER: &str = "92-upgrade-cluster.yml";

pub struct UpgradeClusterPhase {
    pub version: String,
}

#[async_trait]
impl Phase for UpgradeClusterPhase {
    fn name(&self) -> &str {
        "upgradeCluster"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook_with_vars(
            ctx,
            UPGRADE_CLUSTER,
            "",
            &[("kube_upgrade_version", self.version.as_str())],
        )
        .await
    }
}
