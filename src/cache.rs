//! Refresh cache - the latest discovery snapshot, shared with readers
//!
//! Every update builds a fresh [`ScanSnapshot`] and swaps it in wholesale,
//! so a reader holding an `Arc` never sees fields from two different cycles.

use crate::aggregate::{HostRecord, ServiceTargetGroup};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Complete, internally consistent result of one discovery cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSnapshot {
    pub groups: Vec<ServiceTargetGroup>,
    pub hosts: Vec<HostRecord>,
    /// False only until the first successful cycle
    pub ready: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// Number of successful replaces so far
    pub cycle: u64,
}

/// One writer, many readers; readers only ever clone an `Arc`
#[derive(Debug, Default)]
pub struct RefreshCache {
    current: RwLock<Arc<ScanSnapshot>>,
}

impl RefreshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; never waits on an in-flight cycle
    pub fn snapshot(&self) -> Arc<ScanSnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Publish a cycle's result and mark the cache ready
    pub fn replace(&self, groups: Vec<ServiceTargetGroup>, hosts: Vec<HostRecord>) -> Arc<ScanSnapshot> {
        let updated_at = Some(Utc::now());

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(ScanSnapshot {
            groups,
            hosts,
            ready: true,
            updated_at,
            cycle: guard.cycle + 1,
        });
        *guard = Arc::clone(&next);
        next
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().ready
    }
}
