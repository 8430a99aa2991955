//! Target catalog: which ports matter and how matches are grouped

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One port of interest and the job/labels applied when it is found open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub port: u16,
    pub name: String,
    pub job: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl PortSpec {
    pub fn new(port: u16, name: &str, job: &str) -> Self {
        Self {
            port,
            name: name.to_string(),
            job: job.to_string(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }
}

/// Built-in port set used when no catalog is configured
pub fn default_port_specs() -> Vec<PortSpec> {
    vec![
        PortSpec::new(9182, "windows_exporter", "windows_exporter"),
        PortSpec::new(80, "http", "http_services"),
        PortSpec::new(443, "https", "http_services"),
        PortSpec::new(8080, "http-proxy", "http_services"),
        PortSpec::new(8083, "http-alt", "http_services"),
        PortSpec::new(8089, "http-alt", "http_services"),
        PortSpec::new(8888, "http-alt", "http_services"),
        PortSpec::new(38089, "custom", "http_services"),
    ]
}

/// Ordered, never-empty list of [`PortSpec`]s
///
/// Lookups are "first match wins": if two specs declare the same port, the
/// one listed first owns every match for that port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCatalog {
    specs: Vec<PortSpec>,
}

impl TargetCatalog {
    /// Build a catalog, substituting the defaults for an absent or empty list
    pub fn load(specs: Option<Vec<PortSpec>>) -> Self {
        match specs {
            Some(specs) if !specs.is_empty() => Self { specs },
            _ => {
                log::debug!("No port catalog configured, using built-in defaults");
                Self::default()
            }
        }
    }

    /// First spec declaring `port`
    pub fn lookup(&self, port: u16) -> Option<&PortSpec> {
        self.specs.iter().find(|spec| spec.port == port)
    }

    /// Catalog position of the spec owning `port`
    pub fn position(&self, port: u16) -> Option<usize> {
        self.specs.iter().position(|spec| spec.port == port)
    }

    /// Deduplicated port set, in catalog order
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            if !ports.contains(&spec.port) {
                ports.push(spec.port);
            }
        }
        ports
    }

    /// Port set formatted for nmap's `-p` flag
    pub fn port_list(&self) -> String {
        self.ports()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn get(&self, index: usize) -> Option<&PortSpec> {
        self.specs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for TargetCatalog {
    fn default() -> Self {
        Self {
            specs: default_port_specs(),
        }
    }
}
