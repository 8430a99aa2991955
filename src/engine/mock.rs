//! Canned [`ProbeEngine`] for tests and dry runs

use super::{ProbeEngine, ProbeMode, ProbeRequest, RawHostFact, RawScanResult};
use crate::{ScanError, ScanResult};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum MockResponse {
    Ok(RawScanResult),
    Fail(String),
}

impl Default for MockResponse {
    fn default() -> Self {
        MockResponse::Ok(RawScanResult::default())
    }
}

/// Engine returning preconfigured results per [`ProbeMode`]
///
/// Responses can be swapped while the engine is shared, which lets a test
/// drive several cycles through one orchestrator.
#[derive(Debug, Default)]
pub struct MockEngine {
    liveness: Mutex<MockResponse>,
    service: Mutex<MockResponse>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<ProbeRequest>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Liveness pass reports these hosts
    pub fn with_live_hosts(self, hosts: Vec<RawHostFact>) -> Self {
        self.set_live_hosts(hosts);
        self
    }

    /// Service pass reports these facts
    pub fn with_service_facts(self, facts: Vec<RawHostFact>) -> Self {
        self.set_service_facts(facts);
        self
    }

    pub fn with_warnings(self, warnings: Vec<String>) -> Self {
        for slot in [&self.liveness, &self.service] {
            let mut response = lock(slot);
            if let MockResponse::Ok(result) = &mut *response {
                result.warnings = warnings.clone();
            }
        }
        self
    }

    /// Every probe sleeps this long before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    pub fn set_live_hosts(&self, hosts: Vec<RawHostFact>) {
        *lock(&self.liveness) = MockResponse::Ok(RawScanResult {
            hosts,
            warnings: Vec::new(),
        });
    }

    pub fn set_service_facts(&self, facts: Vec<RawHostFact>) {
        *lock(&self.service) = MockResponse::Ok(RawScanResult {
            hosts: facts,
            warnings: Vec::new(),
        });
    }

    pub fn fail_liveness(&self, message: &str) {
        *lock(&self.liveness) = MockResponse::Fail(message.to_string());
    }

    pub fn fail_service(&self, message: &str) {
        *lock(&self.service) = MockResponse::Fail(message.to_string());
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Requests received so far, oldest first
    pub fn calls(&self) -> Vec<ProbeRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, mode: ProbeMode) -> usize {
        lock(&self.calls).iter().filter(|r| r.mode == mode).count()
    }
}

#[async_trait]
impl ProbeEngine for MockEngine {
    async fn probe(&self, request: &ProbeRequest) -> ScanResult<RawScanResult> {
        lock(&self.calls).push(request.clone());

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = match request.mode {
            ProbeMode::Liveness => lock(&self.liveness).clone(),
            ProbeMode::ServiceDetection => lock(&self.service).clone(),
        };

        match response {
            MockResponse::Ok(result) => Ok(result),
            MockResponse::Fail(msg) => Err(ScanError::Engine(msg)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
