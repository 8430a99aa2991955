//! Scan orchestrator - one discovery cycle, start to finish
//!
//! Discovering then probing, sequential, no retry. Both phases draw from one
//! deadline fixed when the cycle starts.

use crate::aggregate::{aggregate, HostRecord, LabelMergePolicy, ServiceTargetGroup};
use crate::catalog::TargetCatalog;
use crate::discovery::discover;
use crate::engine::ProbeEngine;
use crate::probe::probe;
use crate::ScanResult;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default budget for a whole cycle
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Result of a successful cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub groups: Vec<ServiceTargetGroup>,
    pub hosts: Vec<HostRecord>,
    /// Hosts that answered the liveness pass
    pub live_hosts: usize,
    pub elapsed: Duration,
}

/// Composes discovery, probing and aggregation
pub struct ScanOrchestrator {
    engine: Arc<dyn ProbeEngine>,
    cidr: String,
    catalog: TargetCatalog,
    timeout: Duration,
    label_policy: LabelMergePolicy,
}

impl ScanOrchestrator {
    pub fn new(engine: Arc<dyn ProbeEngine>, cidr: &str, catalog: TargetCatalog) -> Self {
        Self {
            engine,
            cidr: cidr.to_string(),
            catalog,
            timeout: DEFAULT_CYCLE_TIMEOUT,
            label_policy: LabelMergePolicy::default(),
        }
    }

    /// Set the budget shared by both phases
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_label_policy(mut self, policy: LabelMergePolicy) -> Self {
        self.label_policy = policy;
        self
    }

    pub fn cidr(&self) -> &str {
        &self.cidr
    }

    pub fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one discovery cycle
    ///
    /// Touches no shared state: the caller decides what to do with the
    /// outcome. Zero live hosts is a successful, empty outcome.
    pub async fn run_cycle(&self) -> ScanResult<CycleOutcome> {
        let started = Instant::now();
        let deadline = started.checked_add(self.timeout).unwrap_or_else(|| {
            warn!("Cycle budget {:?} is out of range, using {:?}", self.timeout, DEFAULT_CYCLE_TIMEOUT);
            started + DEFAULT_CYCLE_TIMEOUT
        });

        info!(
            "Starting discovery cycle on {} ({} ports, budget {:?})",
            self.cidr,
            self.catalog.ports().len(),
            self.timeout
        );

        let hosts = discover(self.engine.as_ref(), &self.cidr, deadline).await?;
        if hosts.is_empty() {
            warn!("No active hosts found in {}", self.cidr);
            return Ok(CycleOutcome {
                elapsed: started.elapsed(),
                ..CycleOutcome::default()
            });
        }

        info!("Found {} active hosts, scanning ports", hosts.len());
        debug!("Active hosts: {:?}", hosts);

        let facts = probe(self.engine.as_ref(), &hosts, &self.catalog, deadline).await?;
        let aggregation = aggregate(&facts, &self.catalog, self.label_policy);

        let outcome = CycleOutcome {
            groups: aggregation.groups,
            hosts: aggregation.hosts,
            live_hosts: hosts.len(),
            elapsed: started.elapsed(),
        };

        info!(
            "Discovery cycle finished in {:.2}s - {} service groups, {} hosts",
            outcome.elapsed.as_secs_f64(),
            outcome.groups.len(),
            outcome.hosts.len()
        );
        Ok(outcome)
    }
}
