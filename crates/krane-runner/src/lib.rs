//! Automation runner adapter boundary.
//!
//! Every infrastructure phase ultimately asks an external automation
//! runner to execute one playbook with a tag against an inventory of
//! target hosts. This crate owns that boundary: the [`Runner`] trait,
//! the [`InventoryVars`] snapshot passed to it, and the append-only
//! [`LogStore`] the runner streams its output into (keyed by cluster
//! name + log id so the logging subsystem can fetch it later).
//!
//! The runner itself is a black box: it blocks for the duration of the
//! external operation, owns its own bounded-wait semantics, and reports
//! nothing but success or the first fatal error. Retrying is a workflow
//! concern, not a runner concern.

pub mod error;
pub mod inventory;
pub mod logs;
pub mod runner;

pub use error::{Result, RunnerError};
pub use inventory::InventoryVars;
pub use logs::{LogSink, LogStore};
pub use runner::{FailingRunner, NoopRunner, ProcessRunner, Runner, ScriptedRunner};
