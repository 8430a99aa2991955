//! Host discovery - liveness sweep over a CIDR range

use crate::engine::{HostStatus, ProbeEngine, ProbeRequest, RawScanResult};
use crate::{ScanError, ScanResult};
use log::{debug, warn};
use std::net::IpAddr;
use tokio::time::Instant;

/// Return the responsive hosts in `cidr`
///
/// Hosts reported down or unknown, and hosts without an address, are
/// dropped. An empty range is a normal outcome, not an error.
pub async fn discover(
    engine: &dyn ProbeEngine,
    cidr: &str,
    deadline: Instant,
) -> ScanResult<Vec<IpAddr>> {
    debug!("Starting host discovery on {} via {}", cidr, engine.name());

    let request = ProbeRequest::liveness(cidr);
    let result = run_until(engine, &request, deadline).await?;

    let mut active = Vec::new();
    for host in result.hosts {
        match (host.primary_address(), host.status) {
            (Some(ip), HostStatus::Up) => {
                debug!("Found active host {}", ip);
                active.push(ip);
            }
            (Some(ip), status) => debug!("Skipping host {} ({:?})", ip, status),
            (None, _) => debug!("Skipping host with no address"),
        }
    }

    debug!("Host discovery on {} found {} active hosts", cidr, active.len());
    Ok(active)
}

/// Run one engine request under the cycle deadline, logging warnings
pub(crate) async fn run_until(
    engine: &dyn ProbeEngine,
    request: &ProbeRequest,
    deadline: Instant,
) -> ScanResult<RawScanResult> {
    let budget = deadline.saturating_duration_since(Instant::now());
    let result = tokio::time::timeout_at(deadline, engine.probe(request))
        .await
        .map_err(|_| ScanError::Timeout(budget))??;

    for w in &result.warnings {
        warn!("{} warning during {}: {}", engine.name(), request.mode.as_str(), w);
    }
    Ok(result)
}
