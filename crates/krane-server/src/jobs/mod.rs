//! Periodic background jobs.
//!
//! Jobs run on a plain interval loop that observes the supervisor's
//! shutdown signal. The first run happens one full interval after
//! startup so a freshly recovered process is not immediately fanning
//! out against managed infrastructure.

pub mod host_sync;

pub use host_sync::{HostProbe, HostSyncJob, SyncReport, TcpProbe};

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Run `job` every `interval` until the shutdown signal fires
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; swallow that so the first run is
        // one full period out
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(job = name, "periodic job tick");
                    job().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(job = name, "periodic job stopping");
                        return;
                    }
                }
            }
        }
    })
}
