//! Runner trait definition and adapters.
//!
//! A [`Runner`] executes one playbook against an inventory and streams
//! human-readable output into the workflow's log sink. The production
//! adapter shells out to the external automation runner binary; the
//! other implementations exist for tests.

use crate::error::{Result, RunnerError};
use crate::inventory::InventoryVars;
use crate::logs::LogSink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncBufReadExt;
use tracing::debug;

/// Core trait for playbook execution.
///
/// The call is blocking from the caller's perspective: it returns only
/// once the external operation has run to completion or hit its first
/// fatal error. The runner owns its own bounded-wait semantics; the
/// workflow driver enforces no timeout of its own.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `playbook` with `tag` (empty = all tasks) against `inventory`,
    /// appending output to `sink`
    async fn run(
        &self,
        playbook: &str,
        tag: &str,
        inventory: &InventoryVars,
        sink: &LogSink,
    ) -> Result<()>;
}

/// Adapter that invokes the external automation runner as a subprocess.
///
/// Inventory vars are passed as `-e key=value` pairs and host groups as
/// `-g group=host1,host2`; stdout/stderr are streamed line by line into
/// the log sink.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        playbook: &str,
        tag: &str,
        inventory: &InventoryVars,
        sink: &LogSink,
    ) -> Result<()> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("run").arg(playbook);
        if !tag.is_empty() {
            cmd.arg("--tag").arg(tag);
        }
        for (key, value) in inventory.vars() {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        for (group, hosts) in inventory.groups() {
            cmd.arg("-g").arg(format!("{group}={}", hosts.join(",")));
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        debug!(playbook, tag, "spawning automation runner");
        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::Unavailable(format!("{}: {e}", self.program.display())))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // drain both pipes concurrently; reading them in sequence can
        // deadlock once the unread pipe fills
        let out_sink = sink.clone();
        let stdout_task = async move {
            if let Some(out) = stdout {
                let mut lines = tokio::io::BufReader::new(out).lines();
                while let Some(line) = lines.next_line().await? {
                    out_sink.write_line(&line)?;
                }
            }
            Ok::<(), RunnerError>(())
        };
        let err_sink = sink.clone();
        let stderr_task = async move {
            let mut last_line = String::new();
            if let Some(err) = stderr {
                let mut lines = tokio::io::BufReader::new(err).lines();
                while let Some(line) = lines.next_line().await? {
                    err_sink.write_line(&line)?;
                    last_line = line;
                }
            }
            Ok::<String, RunnerError>(last_line)
        };
        let (out_result, err_result) = tokio::join!(stdout_task, stderr_task);
        out_result?;
        let last_error_line = err_result?;

        let status = child
            .wait()
            .await
            .map_err(|e| RunnerError::Unavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            let message = if last_error_line.is_empty() {
                format!("exit status {}", status.code().unwrap_or(-1))
            } else {
                last_error_line
            };
            Err(RunnerError::playbook_failed(playbook, message))
        }
    }
}

/// A runner that succeeds without doing anything, for tests
#[derive(Debug, Default)]
pub struct NoopRunner;

impl NoopRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runner for NoopRunner {
    async fn run(
        &self,
        playbook: &str,
        _tag: &str,
        _inventory: &InventoryVars,
        sink: &LogSink,
    ) -> Result<()> {
        sink.write_line(&format!("PLAY [{playbook}] ok"))?;
        Ok(())
    }
}

/// A runner that always fails with a fixed message, for tests
#[derive(Debug)]
pub struct FailingRunner {
    message: String,
}

impl FailingRunner {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Runner for FailingRunner {
    async fn run(
        &self,
        playbook: &str,
        _tag: &str,
        _inventory: &InventoryVars,
        _sink: &LogSink,
    ) -> Result<()> {
        Err(RunnerError::playbook_failed(playbook, self.message.clone()))
    }
}

/// A runner with per-playbook scripted outcomes that records every
/// invocation, for driver and workflow tests.
///
/// Unscripted playbooks succeed. A scripted failure fires once and is
/// then consumed, so a resumed workflow sees the phase succeed on its
/// second attempt.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next invocation of `playbook` fail with `message`
    pub fn fail_once(self, playbook: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(playbook.into(), message.into());
        self
    }

    /// Playbooks invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(
        &self,
        playbook: &str,
        _tag: &str,
        _inventory: &InventoryVars,
        sink: &LogSink,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(playbook.to_string());
        if let Some(message) = self.failures.lock().unwrap().remove(playbook) {
            return Err(RunnerError::playbook_failed(playbook, message));
        }
        sink.write_line(&format!("PLAY [{playbook}] ok"))?;
        Ok(())
    }
}
