//! Service probe - port, service and OS detection on live hosts

use crate::catalog::TargetCatalog;
use crate::discovery::run_until;
use crate::engine::{ProbeEngine, ProbeRequest, RawHostFact};
use crate::ScanResult;
use log::debug;
use std::net::IpAddr;
use tokio::time::Instant;

/// Probe the catalog's ports on `hosts`
///
/// Never invokes the engine with zero targets.
pub async fn probe(
    engine: &dyn ProbeEngine,
    hosts: &[IpAddr],
    catalog: &TargetCatalog,
    deadline: Instant,
) -> ScanResult<Vec<RawHostFact>> {
    if hosts.is_empty() {
        debug!("No hosts to probe");
        return Ok(Vec::new());
    }

    debug!(
        "Probing {} hosts on ports {} via {}",
        hosts.len(),
        catalog.port_list(),
        engine.name()
    );

    let request = ProbeRequest::service_detection(hosts, catalog.ports());
    let result = run_until(engine, &request, deadline).await?;

    debug!("Service probe reported {} hosts", result.hosts.len());
    Ok(result.hosts)
}
