//! Bounded host-sync job.
//!
//! Refreshes liveness/facts for every host not currently in a
//! transitional status (those are left alone to avoid racing an
//! in-flight provisioning phase). Fan-out is capped by a counting
//! semaphore; each host syncs independently and a failure never aborts
//! its siblings. The same bounded-parallelism discipline is what the
//! other background refreshers in the system reuse.

use crate::events::{Event, EventManager};
use async_trait::async_trait;
use krane_common::{Host, HostFacts, ResourceStatus};
use krane_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// External collaborator that checks one host and optionally gathers
/// fresh facts. `Ok(None)` means the host is alive but no fact refresh
/// is available from this probe.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe(&self, host: &Host) -> anyhow::Result<Option<HostFacts>>;
}

/// Liveness-only probe: a TCP connect against the host's SSH port
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl HostProbe for TcpProbe {
    async fn probe(&self, host: &Host) -> anyhow::Result<Option<HostFacts>> {
        let addr = format!("{}:{}", host.ip, host.port);
        tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| anyhow::anyhow!("connect to {addr} timed out"))??;
        Ok(None)
    }
}

/// Outcome counts of one sync run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Concurrency-limited refresh of every eligible host
pub struct HostSyncJob {
    store: Arc<dyn Store>,
    probe: Arc<dyn HostProbe>,
    events: EventManager,
    concurrency: usize,
}

impl HostSyncJob {
    pub fn new(
        store: Arc<dyn Store>,
        probe: Arc<dyn HostProbe>,
        events: EventManager,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            probe,
            events,
            concurrency: concurrency.max(1),
        }
    }

    /// Sync all eligible hosts; returns once every spawned sync has
    /// completed
    pub async fn run(&self) -> SyncReport {
        let hosts = match self.store.list_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(error = %e, "host sync: listing hosts failed");
                return SyncReport::default();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set: JoinSet<bool> = JoinSet::new();
        let mut report = SyncReport::default();

        for host in hosts {
            if host.status.is_transitional() {
                debug!(host = %host.name, status = %host.status, "host sync: skipping transitional host");
                report.skipped += 1;
                continue;
            }
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let probe = self.probe.clone();
            let events = self.events.clone();
            set.spawn(async move {
                // closed only when the semaphore is dropped, which
                // cannot happen while this task holds a clone
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                sync_one(store.as_ref(), probe.as_ref(), &events, host).await
            });
        }

        // join-all: the job's own completion awaits every sync
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(true) => report.synced += 1,
                Ok(false) => report.failed += 1,
                Err(e) => {
                    warn!(error = %e, "host sync task panicked");
                    report.failed += 1;
                }
            }
        }
        debug!(?report, "host sync finished");
        report
    }
}

async fn sync_one(
    store: &dyn Store,
    probe: &dyn HostProbe,
    events: &EventManager,
    mut host: Host,
) -> bool {
    host.status = ResourceStatus::Synchronizing;
    if let Err(e) = store.save_host(&host).await {
        warn!(host = %host.name, error = %e, "host sync: marking host synchronizing failed");
        return false;
    }

    let success = match probe.probe(&host).await {
        Ok(facts) => {
            if let Some(facts) = facts {
                host.apply_facts(facts);
            }
            host.status = ResourceStatus::Running;
            host.message.clear();
            true
        }
        Err(e) => {
            warn!(host = %host.name, error = %e, "gather host info error");
            host.status = ResourceStatus::Failed;
            host.message = e.to_string();
            false
        }
    };

    if let Err(e) = store.save_host(&host).await {
        warn!(host = %host.name, error = %e, "host sync: persisting host failed");
        return false;
    }
    events.publish(Event::HostSynced {
        host: host.name.clone(),
        success,
    });
    success
}

#[cfg(test)]
mod tests {
    use super::*;
    use krane_store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that tracks its own concurrency high-water mark
    struct GaugeProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
        fail_for: Option<String>,
    }

    impl GaugeProbe {
        fn new(fail_for: Option<&str>) -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_for: fail_for.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl HostProbe for GaugeProbe {
        async fn probe(&self, host: &Host) -> anyhow::Result<Option<HostFacts>> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.fail_for.as_deref() == Some(host.name.as_str()) {
                anyhow::bail!("unreachable");
            }
            Ok(Some(HostFacts {
                architecture: "x86_64".to_string(),
                cpu_cores: 4,
                memory_mb: 8192,
                os: "Ubuntu".to_string(),
                os_version: "22.04".to_string(),
                volumes: Vec::new(),
            }))
        }
    }

    async fn seed_hosts(store: &MemoryStore, count: usize) {
        for i in 0..count {
            let mut host = Host::new(format!("host-{i}"), format!("10.0.0.{}", 10 + i), 22);
            host.status = ResourceStatus::Running;
            store.save_host(&host).await.unwrap();
        }
    }

    /// P6: with M hosts and limit K < M, at most K probes run at once
    /// and all M complete before the job returns.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_out_is_bounded_and_complete() {
        let store = Arc::new(MemoryStore::new());
        seed_hosts(&store, 9).await;
        let probe = Arc::new(GaugeProbe::new(None));

        let job = HostSyncJob::new(store.clone(), probe.clone(), EventManager::new(), 2);
        let report = job.run().await;

        assert_eq!(report.synced, 9);
        assert_eq!(report.failed, 0);
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        // the semaphore was actually contended, not serialized by luck
        assert!(probe.peak.load(Ordering::SeqCst) >= 1);

        for host in store.list_hosts().await.unwrap() {
            assert_eq!(host.status, ResourceStatus::Running);
            assert_eq!(host.cpu_cores, Some(4));
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_siblings() {
        let store = Arc::new(MemoryStore::new());
        seed_hosts(&store, 3).await;
        let probe = Arc::new(GaugeProbe::new(Some("host-1")));

        let job = HostSyncJob::new(store.clone(), probe, EventManager::new(), 2);
        let report = job.run().await;

        assert_eq!(report.synced, 2);
        assert_eq!(report.failed, 1);

        let failed = store.get_host_by_name("host-1").await.unwrap().unwrap();
        assert_eq!(failed.status, ResourceStatus::Failed);
        assert_eq!(failed.message, "unreachable");
        let ok = store.get_host_by_name("host-0").await.unwrap().unwrap();
        assert_eq!(ok.status, ResourceStatus::Running);
    }

    #[tokio::test]
    async fn test_transitional_hosts_are_left_alone() {
        let store = Arc::new(MemoryStore::new());
        seed_hosts(&store, 2).await;
        let mut busy = Host::new("busy", "10.0.0.99", 22);
        busy.status = ResourceStatus::Initializing;
        store.save_host(&busy).await.unwrap();

        let job = HostSyncJob::new(
            store.clone(),
            Arc::new(GaugeProbe::new(None)),
            EventManager::new(),
            4,
        );
        let report = job.run().await;

        assert_eq!(report.synced, 2);
        assert_eq!(report.skipped, 1);
        let busy = store.get_host_by_name("busy").await.unwrap().unwrap();
        assert_eq!(busy.status, ResourceStatus::Initializing);
    }

    #[tokio::test]
    async fn test_sync_publishes_events() {
        let store = Arc::new(MemoryStore::new());
        seed_hosts(&store, 1).await;
        let events = EventManager::new();
        let mut rx = events.subscribe();

        let job = HostSyncJob::new(store, Arc::new(GaugeProbe::new(None)), events, 1);
        job.run().await;

        match rx.recv().await.unwrap() {
            Event::HostSynced { host, success } => {
                assert_eq!(host, "host-0");
                assert!(success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
