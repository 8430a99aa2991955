//! nmap-sd - network service discovery for Prometheus
//!
//! Sweeps a CIDR range with nmap, maps open ports onto a catalog of jobs and
//! serves the result as an `http_sd` document. A background scheduler keeps
//! the snapshot fresh; readers never wait on a scan.

pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod probe;
pub mod scheduler;
pub mod server;

// Re-export commonly used types
pub use aggregate::{HostRecord, LabelMergePolicy, PortRecord, ServiceTargetGroup};
pub use cache::{RefreshCache, ScanSnapshot};
pub use catalog::{PortSpec, TargetCatalog};
pub use config::SdConfig;
pub use engine::{MockEngine, NmapConfig, NmapEngine, ProbeEngine};
pub use error::{ScanError, ScanResult};
pub use orchestrator::{CycleOutcome, ScanOrchestrator};
pub use output::FilePublisher;
pub use scheduler::{RefreshStatus, Refresher};

pub type Result<T> = std::result::Result<T, ScanError>;

use std::sync::Arc;

/// Wire an orchestrator and refresher from a normalized config
///
/// Returns the refresher (spawn it to start cycling) and the router reading
/// from the same cache, ready to be served or merged into a larger app.
pub fn build_service(
    config: &SdConfig,
    engine: Arc<dyn ProbeEngine>,
) -> (Arc<Refresher>, axum::Router) {
    let orchestrator = ScanOrchestrator::new(engine, &config.cidr, config.catalog())
        .with_timeout(config.cycle_timeout())
        .with_label_policy(config.label_policy());

    let cache = Arc::new(RefreshCache::new());
    let refresher = Refresher::new(orchestrator, Arc::clone(&cache), config.interval())
        .with_publisher(config.publisher());
    let router = server::router(cache, &config.scan_path, &config.info_path);

    (Arc::new(refresher), router)
}
