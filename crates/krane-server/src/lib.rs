//! krane server: workflow supervision and background jobs.
//!
//! Startup sequencing is load-bearing: the crash-recovery hook runs to
//! completion against a quiescent store *before* the supervisor, the
//! jobs, or any administrative surface accepts work. A recovery failure
//! is fatal — continuing with inconsistent workflow state is worse than
//! not starting.
//!
//! The administrative API (HTTP routing, auth) is an external
//! collaborator; it drives [`ClusterService`] directly.

pub mod config;
pub mod events;
pub mod jobs;
pub mod notify;
pub mod recovery;
pub mod runtime;
pub mod service;
pub mod supervisor;

pub use config::Config;
pub use events::{Event, EventManager};
pub use notify::{LogNotifier, Notifier, Scope};
pub use recovery::{recover_cluster_tasks, RecoveryReport, TASK_CANCELLED};
pub use service::{ClusterService, CreateOptions, ServiceError};
pub use supervisor::Supervisor;

use anyhow::{Context, Result};
use jobs::{HostProbe, HostSyncJob};
use krane_runner::{LogStore, Runner};
use krane_store::Store;
use std::sync::Arc;
use tracing::info;

/// Fully wired server: supervisor, lifecycle service and jobs over one
/// store/runner pair
pub struct Server {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub events: EventManager,
    pub supervisor: Arc<Supervisor>,
    pub service: Arc<ClusterService>,
    host_sync: Arc<HostSyncJob>,
}

impl Server {
    /// Run crash recovery, then wire every component. Fails (and must
    /// abort startup) when recovery cannot reconcile the store.
    pub async fn bootstrap(
        config: Config,
        store: Arc<dyn Store>,
        runner: Arc<dyn Runner>,
        notifier: Arc<dyn Notifier>,
        probe: Arc<dyn HostProbe>,
    ) -> Result<Self> {
        let report = recover_cluster_tasks(store.as_ref())
            .await
            .context("crash recovery failed; refusing to start with inconsistent workflow state")?;
        if report.total() > 0 {
            info!(cancelled = report.total(), "recovered workflow state from previous instance");
        }

        let events = EventManager::new();
        let supervisor = Supervisor::new();
        let log_store = LogStore::new(&config.log_dir);
        let service = Arc::new(ClusterService::new(
            store.clone(),
            runner,
            notifier,
            events.clone(),
            log_store,
            supervisor.clone(),
            config.poll_interval(),
        ));
        let host_sync = Arc::new(HostSyncJob::new(
            store.clone(),
            probe,
            events.clone(),
            config.host_sync_concurrency,
        ));

        Ok(Self {
            config,
            store,
            events,
            supervisor,
            service,
            host_sync,
        })
    }

    /// Start background jobs and block until `ctrl-c`, then drain
    pub async fn run_until_shutdown(&self) -> Result<()> {
        let job = self.host_sync.clone();
        let sync_handle = jobs::spawn_periodic(
            "host-sync",
            self.config.host_sync_interval(),
            self.supervisor.shutdown_signal(),
            move || {
                let job = job.clone();
                async move {
                    job.run().await;
                }
            },
        );

        info!("krane server ready");
        tokio::signal::ctrl_c()
            .await
            .context("listening for shutdown signal")?;
        info!("shutdown signal received");

        self.supervisor.shutdown().await;
        let _ = sync_handle.await;
        Ok(())
    }
}
