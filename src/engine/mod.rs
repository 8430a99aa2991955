//! Probing engine boundary
//!
//! The pipeline never sends packets itself. It asks a [`ProbeEngine`] to run
//! either a liveness sweep or a port/service/OS pass and receives raw
//! per-host facts back.

pub mod mock;
pub mod nmap;
pub mod xml;

use crate::ScanResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

pub use mock::MockEngine;
pub use nmap::{NmapConfig, NmapEngine};

/// What the engine is asked to determine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Which hosts respond; no per-port checks
    Liveness,
    /// Port state plus service-name and OS fingerprinting
    ServiceDetection,
}

impl ProbeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMode::Liveness => "liveness",
            ProbeMode::ServiceDetection => "service-detection",
        }
    }
}

/// One engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Addresses or ranges, passed through to the engine verbatim
    pub targets: Vec<String>,
    /// Ports to check; ignored for [`ProbeMode::Liveness`]
    pub ports: Vec<u16>,
    pub mode: ProbeMode,
}

impl ProbeRequest {
    pub fn liveness(cidr: &str) -> Self {
        Self {
            targets: vec![cidr.to_string()],
            ports: Vec::new(),
            mode: ProbeMode::Liveness,
        }
    }

    pub fn service_detection(hosts: &[IpAddr], ports: Vec<u16>) -> Self {
        Self {
            targets: hosts.iter().map(|h| h.to_string()).collect(),
            ports,
            mode: ProbeMode::ServiceDetection,
        }
    }
}

/// Host liveness as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Up,
    Down,
    Unknown,
}

impl FromStr for HostStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "up" => HostStatus::Up,
            "down" => HostStatus::Down,
            _ => HostStatus::Unknown,
        })
    }
}

/// Port state enumeration, using the engine's vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "filtered")]
    Filtered,
    #[serde(rename = "open|filtered")]
    OpenFiltered,
    #[serde(rename = "closed|filtered")]
    ClosedFiltered,
    #[serde(rename = "unfiltered")]
    Unfiltered,
    #[serde(rename = "unknown")]
    Unknown,
}

impl PortState {
    /// Whether a port in this state is hidden from host records
    pub fn is_excluded(&self) -> bool {
        matches!(self, PortState::Closed | PortState::Filtered)
    }
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::OpenFiltered => write!(f, "open|filtered"),
            PortState::ClosedFiltered => write!(f, "closed|filtered"),
            PortState::Unfiltered => write!(f, "unfiltered"),
            PortState::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for PortState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "open" => PortState::Open,
            "closed" => PortState::Closed,
            "filtered" => PortState::Filtered,
            "open|filtered" => PortState::OpenFiltered,
            "closed|filtered" => PortState::ClosedFiltered,
            "unfiltered" => PortState::Unfiltered,
            _ => PortState::Unknown,
        })
    }
}

/// OS guess with the engine's accuracy score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsMatch {
    pub name: String,
    pub accuracy: u8,
}

/// Raw per-port observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPort {
    pub port: u16,
    pub state: PortState,
    pub service: Option<String>,
}

/// Everything the engine reported about one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHostFact {
    pub addresses: Vec<IpAddr>,
    pub status: HostStatus,
    pub hostnames: Vec<String>,
    /// Ordered by descending accuracy, as the engine reports them
    pub os_matches: Vec<OsMatch>,
    pub ports: Vec<RawPort>,
}

impl RawHostFact {
    pub fn new(status: HostStatus) -> Self {
        Self {
            addresses: Vec::new(),
            status,
            hostnames: Vec::new(),
            os_matches: Vec::new(),
            ports: Vec::new(),
        }
    }

    /// A responsive host with a single address
    pub fn up(ip: IpAddr) -> Self {
        Self::new(HostStatus::Up).with_address(ip)
    }

    pub fn with_address(mut self, ip: IpAddr) -> Self {
        self.addresses.push(ip);
        self
    }

    pub fn with_hostname(mut self, name: &str) -> Self {
        self.hostnames.push(name.to_string());
        self
    }

    pub fn with_os(mut self, name: &str, accuracy: u8) -> Self {
        self.os_matches.push(OsMatch {
            name: name.to_string(),
            accuracy,
        });
        self
    }

    pub fn with_port(mut self, port: u16, state: PortState, service: Option<&str>) -> Self {
        self.ports.push(RawPort {
            port,
            state,
            service: service.map(str::to_string),
        });
        self
    }

    /// Address used for targets and host records
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.addresses.first().copied()
    }
}

/// Output of one engine run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawScanResult {
    pub hosts: Vec<RawHostFact>,
    /// Non-fatal diagnostics (partial resolution and the like)
    pub warnings: Vec<String>,
}

/// Network probing capability
///
/// Implementations return `ScanError::Engine` when they cannot start or the
/// run fails outright. Anything recoverable goes into
/// [`RawScanResult::warnings`]. Dropping the returned future must abort the
/// run.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> ScanResult<RawScanResult>;

    /// Engine name for logs
    fn name(&self) -> &str;
}
