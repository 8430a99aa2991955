//! End-to-end discovery cycles against the mock engine
//! Covers empty ranges, stale-on-failure and the refresh path into the cache

use nmap_sd::{
    engine::{PortState, ProbeMode, RawHostFact},
    MockEngine, PortSpec, RefreshCache, RefreshStatus, Refresher, ScanError, ScanOrchestrator,
    TargetCatalog,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn catalog() -> TargetCatalog {
    TargetCatalog::load(Some(vec![
        PortSpec::new(80, "http", "web"),
        PortSpec::new(9182, "windows_exporter", "node"),
    ]))
}

fn scenario_engine() -> MockEngine {
    MockEngine::new()
        .with_live_hosts(vec![
            RawHostFact::up(ip("10.0.0.5")),
            RawHostFact::up(ip("10.0.0.9")),
        ])
        .with_service_facts(vec![
            RawHostFact::up(ip("10.0.0.5"))
                .with_port(80, PortState::Open, Some("http"))
                .with_port(22, PortState::Closed, None),
            RawHostFact::up(ip("10.0.0.9"))
                .with_hostname("nine.lan")
                .with_os("Windows Server 2019", 96)
                .with_port(80, PortState::Open, Some("http"))
                .with_port(9182, PortState::Open, None),
        ])
}

fn refresher(engine: Arc<MockEngine>, timeout: Duration) -> Refresher {
    let orchestrator =
        ScanOrchestrator::new(engine, "10.0.0.0/24", catalog()).with_timeout(timeout);
    Refresher::new(orchestrator, Arc::new(RefreshCache::new()), Duration::from_secs(60))
}

#[tokio::test]
async fn test_concrete_scenario_document() {
    let engine = Arc::new(scenario_engine());
    let refresher = refresher(Arc::clone(&engine), Duration::from_secs(600));

    assert_eq!(
        refresher.refresh().await,
        RefreshStatus::Updated { groups: 2, hosts: 2 }
    );

    let snapshot = refresher.cache().snapshot();
    let document = serde_json::to_string(&snapshot.groups).unwrap();
    assert_eq!(
        document,
        r#"[{"targets":["10.0.0.5:80","10.0.0.9:80"],"labels":{"job":"web"}},{"targets":["10.0.0.9:9182"],"labels":{"job":"node"}}]"#
    );

    // closed port dropped from the host view
    assert_eq!(snapshot.hosts[0].ports.len(), 1);
    assert_eq!(snapshot.hosts[1].hostname.as_deref(), Some("nine.lan"));
    assert_eq!(snapshot.hosts[1].os.as_deref(), Some("Windows Server 2019"));
}

#[tokio::test]
async fn test_empty_range_is_success() {
    let engine = Arc::new(MockEngine::new());
    let refresher = refresher(Arc::clone(&engine), Duration::from_secs(600));

    assert_eq!(
        refresher.refresh().await,
        RefreshStatus::Updated { groups: 0, hosts: 0 }
    );

    let snapshot = refresher.cache().snapshot();
    assert!(snapshot.ready);
    assert!(snapshot.groups.is_empty());
    assert_eq!(engine.call_count(ProbeMode::ServiceDetection), 0);
}

#[tokio::test]
async fn test_engine_failure_keeps_previous_snapshot() {
    let engine = Arc::new(scenario_engine());
    let refresher = refresher(Arc::clone(&engine), Duration::from_secs(600));
    refresher.refresh().await;
    let before = refresher.cache().snapshot();

    engine.fail_service("nmap exited with status 1");
    assert_eq!(refresher.refresh().await, RefreshStatus::Failed);

    let after = refresher.cache().snapshot();
    assert_eq!(after.cycle, before.cycle);
    assert_eq!(after.groups, before.groups);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn test_liveness_failure_before_first_success_stays_not_ready() {
    let engine = Arc::new(MockEngine::new());
    engine.fail_liveness("failed to start nmap");
    let refresher = refresher(Arc::clone(&engine), Duration::from_secs(600));

    assert_eq!(refresher.refresh().await, RefreshStatus::Failed);
    assert!(!refresher.cache().is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_keeps_previous_snapshot() {
    let engine = Arc::new(scenario_engine());
    let refresher = refresher(Arc::clone(&engine), Duration::from_secs(30));
    refresher.refresh().await;
    let before = refresher.cache().snapshot();

    engine.set_delay(Some(Duration::from_secs(120)));
    assert_eq!(refresher.refresh().await, RefreshStatus::Failed);

    let after = refresher.cache().snapshot();
    assert_eq!(after.cycle, before.cycle);
    assert_eq!(after.groups, before.groups);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_is_shared_between_phases() {
    // each phase fits the budget alone but not together
    let engine = Arc::new(scenario_engine().with_delay(Duration::from_secs(20)));
    let orchestrator =
        ScanOrchestrator::new(engine, "10.0.0.0/24", catalog()).with_timeout(Duration::from_secs(30));

    let err = orchestrator.run_cycle().await.unwrap_err();
    assert!(matches!(err, ScanError::Timeout(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_recovery_after_failure() {
    let engine = Arc::new(scenario_engine());
    engine.fail_liveness("network unreachable");
    let refresher = refresher(Arc::clone(&engine), Duration::from_secs(600));
    assert_eq!(refresher.refresh().await, RefreshStatus::Failed);

    engine.set_live_hosts(vec![RawHostFact::up(ip("10.0.0.5"))]);
    assert!(matches!(refresher.refresh().await, RefreshStatus::Updated { .. }));
    assert_eq!(refresher.cache().snapshot().cycle, 1);
}

#[tokio::test]
async fn test_probe_requests_cover_live_hosts_and_catalog_ports() {
    let engine = Arc::new(scenario_engine());
    let orchestrator = ScanOrchestrator::new(engine.clone(), "10.0.0.0/24", catalog());
    let outcome = orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome.live_hosts, 2);

    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].mode, ProbeMode::Liveness);
    assert_eq!(calls[0].targets, vec!["10.0.0.0/24"]);
    assert_eq!(calls[1].mode, ProbeMode::ServiceDetection);
    assert_eq!(calls[1].targets, vec!["10.0.0.5", "10.0.0.9"]);
    assert_eq!(calls[1].ports, vec![80, 9182]);
}
