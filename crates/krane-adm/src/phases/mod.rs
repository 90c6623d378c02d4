//! Concrete phase implementations, grouped by provisioning stage.
//!
//! Each phase binds exactly one playbook (plus optional tag and vars).
//! Phase names are persisted identifiers; treat them as frozen.

pub mod backup;
pub mod initial;
pub mod plugin;
pub mod prepare;
pub mod reset;
pub mod upgrade;

use crate::error::Result;
use crate::phase::{Phase, PhaseContext};
use async_trait::async_trait;

/// Marker phase that opens a workflow's transcript with a banner line.
/// Cheap and always first, so a freshly launched workflow produces a
/// detail (and a log line) before the first real playbook starts.
pub struct TaskStartPhase {
    name: &'static str,
    banner: &'static str,
}

impl TaskStartPhase {
    pub fn create() -> Self {
        Self {
            name: "Init Task Start",
            banner: "----init cluster task start----",
        }
    }

    pub fn add_worker() -> Self {
        Self {
            name: "Add Worker Task Start",
            banner: "----add worker task start----",
        }
    }
}

#[async_trait]
impl Phase for TaskStartPhase {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        ctx.sink.write_line(self.banner)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krane_runner::{InventoryVars, LogSink, NoopRunner};

    #[tokio::test]
    async fn test_task_start_writes_banner() {
        let (sink, buf) = LogSink::buffered();
        let runner = NoopRunner::new();
        let inventory = InventoryVars::new();
        let ctx = PhaseContext {
            runner: &runner,
            inventory: &inventory,
            sink: &sink,
        };

        let phase = TaskStartPhase::add_worker();
        assert_eq!(phase.name(), "Add Worker Task Start");
        phase.run(&ctx).await.unwrap();

        let output = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(output.contains("add worker task start"));
    }
}
