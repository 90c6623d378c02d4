//! Inventory snapshot handed to the automation runner.
//!
//! A workflow snapshots its cluster's hosts and operation parameters into
//! an `InventoryVars` once at launch; phases only add phase-specific vars
//! on top. Handlers never mutate shared state between invocations.

use std::collections::BTreeMap;

/// Host groups plus flat variables for one runner invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryVars {
    vars: BTreeMap<String, String>,
    groups: BTreeMap<String, Vec<String>>,
}

impl InventoryVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add a host to a group (e.g. `master`, `worker`, `new-worker`)
    pub fn add_host(&mut self, group: impl Into<String>, host: impl Into<String>) {
        self.groups.entry(group.into()).or_default().push(host.into());
    }

    pub fn group(&self, name: &str) -> &[String] {
        self.groups.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn host_count(&self) -> usize {
        self.groups.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_var() {
        let mut inv = InventoryVars::new();
        inv.set_var("kube_upgrade_version", "v1.28.4");
        assert_eq!(inv.var("kube_upgrade_version"), Some("v1.28.4"));
        assert_eq!(inv.var("missing"), None);

        inv.set_var("kube_upgrade_version", "v1.29.0");
        assert_eq!(inv.var("kube_upgrade_version"), Some("v1.29.0"));
    }

    #[test]
    fn test_host_groups() {
        let mut inv = InventoryVars::new();
        inv.add_host("master", "master-1");
        inv.add_host("worker", "worker-1");
        inv.add_host("worker", "worker-2");

        assert_eq!(inv.group("master"), ["master-1".to_string()]);
        assert_eq!(inv.group("worker").len(), 2);
        assert_eq!(inv.group("absent").len(), 0);
        assert_eq!(inv.host_count(), 3);
    }
}
