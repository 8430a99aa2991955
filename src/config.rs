//! Configuration for the discovery service
//!
//! Values come from a TOML file (or `~/.nmap-sd.toml`), then CLI overrides,
//! then [`SdConfig::normalize`]. Normalization never fails: each bad value is
//! replaced by its own default and logged, leaving the other options alone.

use crate::aggregate::LabelMergePolicy;
use crate::catalog::{PortSpec, TargetCatalog};
use crate::engine::NmapConfig;
use crate::output::FilePublisher;
use crate::server::HEALTH_PATH;
use crate::ScanError;
use ipnetwork::IpNetwork;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CIDR: &str = "192.168.2.0/22";
pub const DEFAULT_SCAN_PATH: &str = "/mgsd";
pub const DEFAULT_INFO_PATH: &str = "/info";
pub const DEFAULT_SCAN_INTERVAL_MINUTES: i64 = 1;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_CYCLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CONFIG_FILE: &str = ".nmap-sd.toml";
/// One week
pub const MAX_SCAN_INTERVAL_MINUTES: i64 = 7 * 24 * 60;
/// One day
pub const MAX_CYCLE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Service configuration as read from file and command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdConfig {
    /// Network range to sweep
    pub cidr: String,
    /// Route serving the discovery document
    pub scan_path: String,
    /// Minutes between cycles
    pub scan_interval: i64,
    /// Port catalog; absent or empty means the built-in one
    pub ports: Option<Vec<PortSpec>>,
    pub log_level: String,
    pub info_path: String,
    pub listen: String,
    /// Budget for one whole cycle, in seconds
    pub cycle_timeout_secs: u64,
    pub nmap_path: String,
    pub os_detection: bool,
    pub label_merge: String,
    /// Write the discovery document here after every successful cycle
    pub output_file: Option<PathBuf>,
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            cidr: DEFAULT_CIDR.to_string(),
            scan_path: DEFAULT_SCAN_PATH.to_string(),
            scan_interval: DEFAULT_SCAN_INTERVAL_MINUTES,
            ports: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            info_path: DEFAULT_INFO_PATH.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            cycle_timeout_secs: DEFAULT_CYCLE_TIMEOUT_SECS,
            nmap_path: "nmap".to_string(),
            os_detection: true,
            label_merge: "first_wins".to_string(),
            output_file: None,
        }
    }
}

impl SdConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| ScanError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// `~/.nmap-sd.toml`, falling back to the current directory without a home
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    /// Load from the default location, or defaults if it is missing or broken
    ///
    /// Runs before the logger exists, so it reports on stderr directly.
    pub fn load_default_config() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::from_toml_file(&path) {
            Ok(config) => {
                eprintln!("[~] Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("[!] Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Replace every invalid option by its default
    pub fn normalize(mut self) -> Self {
        if self.cidr.trim().parse::<IpNetwork>().is_err() {
            warn!("Invalid CIDR '{}', using default {}", self.cidr, DEFAULT_CIDR);
            self.cidr = DEFAULT_CIDR.to_string();
        } else {
            self.cidr = self.cidr.trim().to_string();
        }

        self.normalize_routes();

        if self.scan_interval <= 0 || self.scan_interval > MAX_SCAN_INTERVAL_MINUTES {
            warn!(
                "Invalid scan_interval {}, using default of {} minute(s)",
                self.scan_interval, DEFAULT_SCAN_INTERVAL_MINUTES
            );
            self.scan_interval = DEFAULT_SCAN_INTERVAL_MINUTES;
        }

        if self.cycle_timeout_secs == 0 || self.cycle_timeout_secs > MAX_CYCLE_TIMEOUT_SECS {
            warn!(
                "cycle_timeout_secs must be between 1 and {}, using {}",
                MAX_CYCLE_TIMEOUT_SECS, DEFAULT_CYCLE_TIMEOUT_SECS
            );
            self.cycle_timeout_secs = DEFAULT_CYCLE_TIMEOUT_SECS;
        }

        let mut level = self.log_level.trim().to_uppercase();
        if level == "WARNING" {
            level = "WARN".to_string();
        }
        if crate::logging::is_known_level(&level) {
            self.log_level = level;
        } else {
            warn!("Unknown log_level '{}', using {}", self.log_level, DEFAULT_LOG_LEVEL);
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }

        if self.listen.parse::<SocketAddr>().is_err() {
            warn!("Invalid listen address '{}', using {}", self.listen, DEFAULT_LISTEN);
            self.listen = DEFAULT_LISTEN.to_string();
        }

        if self.nmap_path.trim().is_empty() {
            self.nmap_path = "nmap".to_string();
        }

        match self.label_merge.parse::<LabelMergePolicy>() {
            Ok(policy) => self.label_merge = policy_name(policy).to_string(),
            Err(e) => {
                warn!("{}, using first_wins", e);
                self.label_merge = policy_name(LabelMergePolicy::FirstWins).to_string();
            }
        }

        if matches!(&self.ports, Some(specs) if specs.is_empty()) {
            warn!("Empty port catalog configured, using the built-in one");
            self.ports = None;
        }

        self
    }

    /// Each route must be well-formed and distinct from the other two
    fn normalize_routes(&mut self) {
        if !is_valid_route(&self.info_path) || self.info_path == HEALTH_PATH {
            warn!("Invalid info_path '{}', using default {}", self.info_path, DEFAULT_INFO_PATH);
            self.info_path = DEFAULT_INFO_PATH.to_string();
        }

        if !is_valid_route(&self.scan_path)
            || self.scan_path == HEALTH_PATH
            || self.scan_path == self.info_path
        {
            warn!("Invalid scan_path '{}', using default {}", self.scan_path, DEFAULT_SCAN_PATH);
            self.scan_path = DEFAULT_SCAN_PATH.to_string();
        }

        // info_path itself was configured as the default scan path
        if self.scan_path == self.info_path {
            warn!(
                "info_path '{}' collides with scan_path, using default {}",
                self.info_path, DEFAULT_INFO_PATH
            );
            self.info_path = DEFAULT_INFO_PATH.to_string();
        }
    }

    pub fn interval(&self) -> Duration {
        let minutes = match self.scan_interval {
            m if m > 0 && m <= MAX_SCAN_INTERVAL_MINUTES => m as u64,
            _ => DEFAULT_SCAN_INTERVAL_MINUTES as u64,
        };
        minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_SCAN_INTERVAL_MINUTES as u64 * 60))
    }

    pub fn cycle_timeout(&self) -> Duration {
        match self.cycle_timeout_secs {
            secs if secs > 0 && secs <= MAX_CYCLE_TIMEOUT_SECS => Duration::from_secs(secs),
            _ => Duration::from_secs(DEFAULT_CYCLE_TIMEOUT_SECS),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080)))
    }

    pub fn label_policy(&self) -> LabelMergePolicy {
        self.label_merge.parse().unwrap_or_default()
    }

    pub fn catalog(&self) -> TargetCatalog {
        TargetCatalog::load(self.ports.clone())
    }

    pub fn nmap_config(&self) -> NmapConfig {
        NmapConfig {
            nmap_path: self.nmap_path.clone(),
            os_detection: self.os_detection,
            ..NmapConfig::default()
        }
    }

    pub fn publisher(&self) -> Option<FilePublisher> {
        self.output_file.as_ref().map(FilePublisher::new)
    }
}

/// Absolute and free of router capture segments
fn is_valid_route(path: &str) -> bool {
    path.starts_with('/') && !path.contains("/:") && !path.contains("/*")
}

fn policy_name(policy: LabelMergePolicy) -> &'static str {
    match policy {
        LabelMergePolicy::FirstWins => "first_wins",
        LabelMergePolicy::LastWins => "last_wins",
    }
}
