//! Server configuration.
//!
//! Loaded from a TOML file with sane defaults for every field, so an
//! empty (or missing) file yields a working demo configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory playbook transcripts are written under
    pub log_dir: PathBuf,
    /// Path of the external automation runner binary
    pub runner_program: PathBuf,
    /// Driver tick interval in seconds
    pub poll_interval_secs: u64,
    /// Host-sync period in seconds (default daily)
    pub host_sync_interval_secs: u64,
    /// Maximum concurrent host syncs
    pub host_sync_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/lib/krane/logs"),
            runner_program: PathBuf::from("/usr/local/bin/krane-runner"),
            poll_interval_secs: 5,
            host_sync_interval_secs: 24 * 60 * 60,
            host_sync_concurrency: 2,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn host_sync_interval(&self) -> Duration {
        Duration::from_secs(self.host_sync_interval_secs)
    }
}
