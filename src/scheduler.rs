//! Scheduler binding - eager first cycle, then a fixed interval
//!
//! At most one cycle is in flight at a time. A tick that arrives while a
//! cycle is still running is skipped, not queued, so an older result can
//! never overwrite a newer one.

use crate::cache::RefreshCache;
use crate::orchestrator::ScanOrchestrator;
use crate::output::FilePublisher;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What a refresh attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Cache replaced with a new snapshot
    Updated { groups: usize, hosts: usize },
    /// Cycle failed; cache left as it was
    Failed,
    /// Another cycle was already running
    Skipped,
}

/// Drives the orchestrator and publishes into the cache
pub struct Refresher {
    orchestrator: ScanOrchestrator,
    cache: Arc<RefreshCache>,
    interval: Duration,
    publisher: Option<FilePublisher>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag even if the cycle future is dropped
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Refresher {
    pub fn new(orchestrator: ScanOrchestrator, cache: Arc<RefreshCache>, interval: Duration) -> Self {
        Self {
            orchestrator,
            cache,
            interval,
            publisher: None,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_publisher(mut self, publisher: Option<FilePublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn cache(&self) -> &Arc<RefreshCache> {
        &self.cache
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle unless one is already in flight
    pub async fn refresh(&self) -> RefreshStatus {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous discovery cycle still running, skipping this tick");
            return RefreshStatus::Skipped;
        }
        let _guard = FlightGuard(&self.in_flight);

        match self.orchestrator.run_cycle().await {
            Ok(outcome) => {
                let groups = outcome.groups.len();
                let hosts = outcome.hosts.len();
                let snapshot = self.cache.replace(outcome.groups, outcome.hosts);

                if let Some(publisher) = &self.publisher {
                    if let Err(e) = publisher.publish(&snapshot.groups).await {
                        error!("Failed to write {}: {}", publisher.path().display(), e);
                    }
                }

                info!("Scan completed: {} service groups, {} hosts", groups, hosts);
                RefreshStatus::Updated { groups, hosts }
            }
            Err(e) => {
                let hint = if e.is_transient() {
                    "retrying next tick"
                } else {
                    "check the configuration"
                };
                error!("Failed to scan network: {} ({}, keeping previous results)", e, hint);
                RefreshStatus::Failed
            }
        }
    }

    /// Start the periodic loop; the first cycle runs immediately
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Scheduler started, refreshing every {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    status = self.refresh() => debug!("Refresh finished: {:?}", status),
                }
            }

            info!("Scheduler stopped");
        })
    }
}
