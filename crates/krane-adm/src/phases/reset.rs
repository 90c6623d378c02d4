//! Cluster reset phase: returns all hosts to their pre-install state.

use crate::error::Result;
use crate::phase::{run_playbook, Phase, PhaseContext};
use async_trait::async_trait;

const RESET_CLUSTER: &str = "99-reset-cluster.yml";

pub struct ResetClusterPhase;

#[async_trait]
impl Phase for ResetClusterPhase {
    fn name(&self) -> &str {
        "ResetCluster"
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        run_playbook(ctx, RESET_CLUSTER, "").await
    }
}
