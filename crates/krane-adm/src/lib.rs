//! Cluster workflow orchestration core.
//!
//! This crate sequences the long-running, failure-prone automation steps
//! that make up one cluster operation (create, add-worker, upgrade,
//! reset, backup, restore). It owns:
//!
//! - the persisted task-log state machine ([`TaskLog`], [`TaskLogDetail`],
//!   [`TaskRetryLog`]),
//! - the [`Phase`] contract and the per-operation ordered registries,
//! - the [`ClusterAdm`] driver that advances one phase per tick and
//!   records every outcome,
//! - the resume controller that reopens a failed workflow at exactly the
//!   phase that failed.
//!
//! Persistence and scheduling live elsewhere: the driver mutates an
//! in-memory [`TaskHelper`] snapshot, and the hosting runtime publishes
//! that snapshot for serialized persistence after every tick.

pub mod adm;
pub mod error;
pub mod phase;
pub mod phases;
pub mod registry;
pub mod retry;
pub mod tasklog;

pub use adm::{ClusterAdm, TaskHelper};
pub use error::{AdmError, Result};
pub use phase::{Phase, PhaseContext};
pub use registry::{ChainParams, PhaseRegistry};
pub use retry::{resume, ResumeOutcome};
pub use tasklog::{Operation, TaskLog, TaskLogDetail, TaskPhase, TaskRetryLog};
