//! Ordered phase registries.
//!
//! A registry is the immutable, ordered chain of phases for one
//! operation type. Ordering is significant: it encodes real
//! infrastructure dependencies (base OS config before container runtime
//! before control plane before networking before post-install). The
//! driver looks phases up by exact name and advances strictly by index;
//! there is no reflection and no fuzzy matching.

use crate::phase::Phase;
use crate::phases::backup::{BackupClusterPhase, RestartClusterPhase, RestoreClusterPhase};
use crate::phases::initial::{
    EtcdPhase, HelmPhase, MasterPhase, MetricsServerPhase, NetworkPhase, PostInitPhase,
    WorkerPhase,
};
use crate::phases::plugin::{
    ClusterStoragePhase, IngressControllerPhase, NpdPhase, RookCephStoragePhase, StorageFlags,
};
use crate::phases::prepare::{
    BaseSystemConfigPhase, CertificatesPhase, ContainerRuntimePhase, KubernetesComponentPhase,
    LoadBalancerPhase,
};
use crate::phases::reset::ResetClusterPhase;
use crate::phases::upgrade::UpgradeClusterPhase;
use crate::phases::TaskStartPhase;
use crate::tasklog::Operation;

/// Inputs that parameterize a chain for one workflow launch. Chains are
/// rebuilt per launch, so handler construction stays cheap and handlers
/// never carry cross-invocation state.
#[derive(Debug, Clone, Default)]
pub struct ChainParams {
    /// Target version for an upgrade workflow
    pub upgrade_version: Option<String>,
    /// Ingress controller flavor to deploy (nginx/traefik)
    pub ingress_controller_type: Option<String>,
    /// Storage provisioner enablement derived from cluster state
    pub storage: StorageFlags,
    /// Deploy rook-ceph as part of create
    pub rook_ceph: bool,
    /// Host path for rook-ceph storage
    pub rook_ceph_path: Option<String>,
}

/// Fixed, ordered sequence of phases for one operation type
pub struct PhaseRegistry {
    phases: Vec<Box<dyn Phase>>,
}

impl PhaseRegistry {
    fn new(phases: Vec<Box<dyn Phase>>) -> Self {
        debug_assert!(
            {
                let mut names: Vec<&str> = phases.iter().map(|p| p.name()).collect();
                names.sort_unstable();
                names.windows(2).all(|w| w[0] != w[1])
            },
            "phase names within a chain must be unique"
        );
        Self { phases }
    }

    /// Build the chain for one operation
    pub fn for_operation(operation: Operation, params: &ChainParams) -> Self {
        match operation {
            Operation::Create => Self::create_chain(params),
            Operation::AddWorker => Self::add_worker_chain(params),
            Operation::Upgrade => Self::new(vec![Box::new(UpgradeClusterPhase {
                version: params.upgrade_version.clone().unwrap_or_default(),
            })]),
            Operation::Reset => Self::new(vec![Box::new(ResetClusterPhase)]),
            Operation::Backup => Self::new(vec![Box::new(BackupClusterPhase)]),
            Operation::Restore => Self::new(vec![
                Box::new(RestoreClusterPhase),
                Box::new(RestartClusterPhase),
            ]),
        }
    }

    fn create_chain(params: &ChainParams) -> Self {
        let mut phases: Vec<Box<dyn Phase>> = vec![
            Box::new(TaskStartPhase::create()),
            Box::new(BaseSystemConfigPhase { add_worker: false }),
            Box::new(ContainerRuntimePhase { add_worker: false }),
            Box::new(KubernetesComponentPhase { add_worker: false }),
            Box::new(LoadBalancerPhase { add_worker: false }),
            Box::new(CertificatesPhase { add_worker: false }),
            Box::new(EtcdPhase { upgrade: false }),
            Box::new(MasterPhase),
            Box::new(WorkerPhase { add_worker: false }),
            Box::new(NetworkPhase { add_worker: false }),
            Box::new(HelmPhase),
            Box::new(NpdPhase),
            Box::new(MetricsServerPhase),
            Box::new(IngressControllerPhase {
                controller_type: params.ingress_controller_type.clone(),
            }),
            Box::new(ClusterStoragePhase {
                add_worker: false,
                flags: params.storage.clone(),
            }),
        ];
        if params.rook_ceph {
            phases.push(Box::new(RookCephStoragePhase {
                storage_path: params.rook_ceph_path.clone(),
            }));
        }
        phases.push(Box::new(PostInitPhase { add_worker: false }));
        Self::new(phases)
    }

    fn add_worker_chain(params: &ChainParams) -> Self {
        Self::new(vec![
            Box::new(TaskStartPhase::add_worker()),
            Box::new(BaseSystemConfigPhase { add_worker: true }),
            Box::new(ContainerRuntimePhase { add_worker: true }),
            Box::new(KubernetesComponentPhase { add_worker: true }),
            Box::new(LoadBalancerPhase { add_worker: true }),
            Box::new(CertificatesPhase { add_worker: true }),
            Box::new(WorkerPhase { add_worker: true }),
            Box::new(NetworkPhase { add_worker: true }),
            Box::new(PostInitPhase { add_worker: true }),
            Box::new(ClusterStoragePhase {
                add_worker: true,
                flags: params.storage.clone(),
            }),
        ])
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn first(&self) -> Option<&dyn Phase> {
        self.phases.first().map(|p| p.as_ref())
    }

    /// Exact-name lookup
    pub fn get(&self, name: &str) -> Option<&dyn Phase> {
        self.phases
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name() == name)
    }

    /// The phase immediately following `name` in declared order; `None`
    /// when `name` is the last phase (or unknown)
    pub fn next_after(&self, name: &str) -> Option<&dyn Phase> {
        let idx = self.position(name)?;
        self.phases.get(idx + 1).map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for PhaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseRegistry")
            .field("phases", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_chain_order() {
        let registry = PhaseRegistry::for_operation(Operation::Create, &ChainParams::default());
        let names = registry.names();

        // infrastructure dependencies encoded as strict ordering
        let base = registry.position("BasicConfigSystem").unwrap();
        let runtime = registry.position("Install Container Runtime").unwrap();
        let etcd = registry.position("InitEtcd").unwrap();
        let master = registry.position("InitMaster").unwrap();
        let network = registry.position("InitNetwork").unwrap();
        assert!(base < runtime && runtime < etcd && etcd < master && master < network);

        assert_eq!(names.first(), Some(&"Init Task Start"));
        assert_eq!(names.last(), Some(&"Post Init"));
    }

    #[test]
    fn test_create_chain_rook_ceph_optional() {
        let without = PhaseRegistry::for_operation(Operation::Create, &ChainParams::default());
        assert!(without.get("CreateRookCephStorage").is_none());

        let params = ChainParams {
            rook_ceph: true,
            ..Default::default()
        };
        let with = PhaseRegistry::for_operation(Operation::Create, &params);
        assert!(with.get("CreateRookCephStorage").is_some());
        assert_eq!(with.len(), without.len() + 1);
    }

    #[test]
    fn test_next_after_is_strictly_sequential() {
        let registry = PhaseRegistry::for_operation(Operation::AddWorker, &ChainParams::default());
        let names = registry.names();
        for window in names.windows(2) {
            let next = registry.next_after(window[0]).unwrap();
            assert_eq!(next.name(), window[1]);
        }
        assert!(registry.next_after(names.last().unwrap()).is_none());
        assert!(registry.next_after("no such phase").is_none());
    }

    #[test]
    fn test_single_phase_chains() {
        for operation in [Operation::Upgrade, Operation::Reset, Operation::Backup] {
            let registry = PhaseRegistry::for_operation(operation, &ChainParams::default());
            assert_eq!(registry.len(), 1);
            assert!(registry.next_after(registry.names()[0]).is_none());
        }

        let restore = PhaseRegistry::for_operation(Operation::Restore, &ChainParams::default());
        assert_eq!(restore.names(), vec!["restoreCluster", "restartCluster"]);
    }

    #[test]
    fn test_names_unique_per_chain() {
        for operation in [
            Operation::Create,
            Operation::AddWorker,
            Operation::Upgrade,
            Operation::Reset,
            Operation::Backup,
            Operation::Restore,
        ] {
            let registry = PhaseRegistry::for_operation(operation, &ChainParams::default());
            let mut names = registry.names();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), registry.len(), "{operation} chain has duplicate names");
        }
    }

    #[test]
    fn test_exact_lookup_rejects_substrings() {
        // "InitWorker" must not match a lookup for "Worker" or "Init"
        let registry = PhaseRegistry::for_operation(Operation::Create, &ChainParams::default());
        assert!(registry.get("InitWorker").is_some());
        assert!(registry.get("Worker").is_none());
        assert!(registry.get("Init").is_none());
    }
}
