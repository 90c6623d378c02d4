//! Persistence collaborator interface.
//!
//! The relational store itself lives outside this repository; krane only
//! depends on the [`Store`] trait: filtered create/find/update operations
//! over clusters, hosts, nodes, provisioners and task logs, plus the
//! all-or-nothing [`StoreTx`] multi-write used by crash recovery.
//!
//! [`MemoryStore`] is the in-process reference implementation backing
//! every test and the demo server.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use store::{Store, StoreTx};
