use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status shared by clusters, hosts, nodes and provisioners.
///
/// The serialized strings are exchanged with external collaborators and
/// must not change:
/// `creating|initializing|synchronizing|waiting|running|upgrading|terminating|failed|notReady|lost`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStatus {
    Creating,
    Initializing,
    Synchronizing,
    Waiting,
    Running,
    Upgrading,
    Terminating,
    Failed,
    NotReady,
    Lost,
}

impl ResourceStatus {
    /// Statuses a cluster can legally be left in across a process restart.
    /// Everything else is force-failed by the crash-recovery hook.
    pub const STABLE: [ResourceStatus; 4] = [
        ResourceStatus::Running,
        ResourceStatus::Failed,
        ResourceStatus::NotReady,
        ResourceStatus::Lost,
    ];

    /// Machine-readable status string for APIs and persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Creating => "creating",
            ResourceStatus::Initializing => "initializing",
            ResourceStatus::Synchronizing => "synchronizing",
            ResourceStatus::Waiting => "waiting",
            ResourceStatus::Running => "running",
            ResourceStatus::Upgrading => "upgrading",
            ResourceStatus::Terminating => "terminating",
            ResourceStatus::Failed => "failed",
            ResourceStatus::NotReady => "notReady",
            ResourceStatus::Lost => "lost",
        }
    }

    /// Whether this status marks an in-flight provisioning step.
    /// The host-sync job leaves transitional hosts alone to avoid racing
    /// an active workflow phase.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ResourceStatus::Creating
                | ResourceStatus::Initializing
                | ResourceStatus::Synchronizing
        )
    }

    pub fn is_stable(&self) -> bool {
        Self::STABLE.contains(self)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the cluster's machines come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Provider {
    BareMetal,
    Plan,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::BareMetal => "bareMetal",
            Provider::Plan => "plan",
        }
    }
}

/// Aggregate root for one managed Kubernetes cluster.
///
/// `current_task_id` points at the task log of the workflow currently (or
/// most recently) executed against the cluster; it is cleared when a
/// workflow finishes successfully. A cluster is never deleted while its
/// current task log is non-terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_version: Option<String>,
    pub provider: Provider,
    pub status: ResourceStatus,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, version: impl Into<String>, provider: Provider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: version.into(),
            upgrade_version: None,
            provider,
            status: ResourceStatus::NotReady,
            message: String::new(),
            current_task_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Role of a node inside the cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

/// Membership of a host in a cluster. Lifecycle is independent of the
/// workflow: created at import/add-worker time, status updated by the
/// host-sync job and by the driver on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub host_id: Uuid,
    pub name: String,
    pub role: NodeRole,
    pub status: ResourceStatus,
    #[serde(default)]
    pub message: String,
}

impl ClusterNode {
    pub fn new(cluster_id: Uuid, host_id: Uuid, name: impl Into<String>, role: NodeRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id,
            host_id,
            name: name.into(),
            role,
            status: ResourceStatus::Initializing,
            message: String::new(),
        }
    }
}

/// A block device reported by a host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub size: String,
}

/// One piece of managed infrastructure, referenced by phases needing
/// target inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub architecture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<Uuid>,
    pub status: ResourceStatus,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl Host {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ip: ip.into(),
            port,
            architecture: String::new(),
            cluster_id: None,
            status: ResourceStatus::Initializing,
            message: String::new(),
            cpu_cores: None,
            memory_mb: None,
            os: None,
            os_version: None,
            volumes: Vec::new(),
        }
    }

    /// Apply freshly gathered facts to the host record
    pub fn apply_facts(&mut self, facts: HostFacts) {
        self.architecture = facts.architecture;
        self.cpu_cores = Some(facts.cpu_cores);
        self.memory_mb = Some(facts.memory_mb);
        self.os = Some(facts.os);
        self.os_version = Some(facts.os_version);
        self.volumes = facts.volumes;
    }
}

/// Liveness and hardware facts gathered from a host by the sync job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostFacts {
    pub architecture: String,
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub os: String,
    pub os_version: String,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// Storage provisioner kinds a cluster can carry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionerKind {
    Nfs,
    Gfs,
    ExternalCephBlock,
    ExternalCephfs,
    RookCeph,
}

impl ProvisionerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerKind::Nfs => "nfs",
            ProvisionerKind::Gfs => "gfs",
            ProvisionerKind::ExternalCephBlock => "external-ceph-block",
            ProvisionerKind::ExternalCephfs => "external-cephfs",
            ProvisionerKind::RookCeph => "rook-ceph",
        }
    }
}

/// A storage provisioner deployed into a cluster. The add-worker storage
/// phase reads the running provisioners to compute its enablement vars;
/// crash recovery force-fails any provisioner caught mid-deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageProvisioner {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub name: String,
    pub kind: ProvisionerKind,
    pub status: ResourceStatus,
    #[serde(default)]
    pub message: String,
    /// Provisioner-specific settings, e.g. `storage_nfs_server_version`
    #[serde(default)]
    pub vars: serde_json::Value,
}

impl StorageProvisioner {
    pub fn new(cluster_id: Uuid, name: impl Into<String>, kind: ProvisionerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            cluster_id,
            name: name.into(),
            kind,
            status: ResourceStatus::Waiting,
            message: String::new(),
            vars: serde_json::Value::Null,
        }
    }
}
