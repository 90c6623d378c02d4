//! Shared domain models for krane.
//!
//! This crate holds the entities every other crate agrees on: clusters,
//! hosts, cluster nodes, storage provisioners, and the status vocabulary
//! exchanged across component boundaries. The status strings are part of
//! the wire contract and must remain stable.

pub mod models;

pub use models::*;
