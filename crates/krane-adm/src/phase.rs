//! Phase contract.
//!
//! A phase is a named, idempotent-intent unit of infrastructure work. Its
//! name is the stable identifier persisted into task-log details and used
//! to resume a workflow at the right place, so it must never change once
//! released.

use crate::error::Result;
use async_trait::async_trait;
use krane_runner::{InventoryVars, LogSink, Runner};

/// Everything a phase needs for one invocation: the automation runner
/// handle, the workflow's inventory snapshot, and the shared log sink.
/// Phases hold no cross-invocation state of their own.
pub struct PhaseContext<'a> {
    pub runner: &'a dyn Runner,
    pub inventory: &'a InventoryVars,
    pub sink: &'a LogSink,
}

/// One discrete infrastructure action within a workflow
#[async_trait]
pub trait Phase: Send + Sync {
    /// Stable identifier used for persistence and resumption matching
    fn name(&self) -> &str;

    /// Perform the action. Returns on the runner's first fatal error;
    /// retry is a workflow-level concern.
    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()>;
}

/// Run one playbook through the adapter and surface its result
pub(crate) async fn run_playbook(ctx: &PhaseContext<'_>, playbook: &str, tag: &str) -> Result<()> {
    ctx.runner
        .run(playbook, tag, ctx.inventory, ctx.sink)
        .await?;
    Ok(())
}

/// Run one playbook with phase-specific vars layered over the workflow
/// inventory snapshot
pub(crate) async fn run_playbook_with_vars(
    ctx: &PhaseContext<'_>,
    playbook: &str,
    tag: &str,
    vars: &[(&str, &str)],
) -> Result<()> {
    let mut inventory = ctx.inventory.clone();
    for (key, value) in vars {
        inventory.set_var(*key, *value);
    }
    ctx.runner
        .run(playbook, tag, &inventory, ctx.sink)
        .await?;
    Ok(())
}
