//! Minimal nmap XML report schema
//!
//! Only the parts the pipeline consumes are modelled; everything else in the
//! report is ignored by the deserializer.

use super::{HostStatus, OsMatch, PortState, RawHostFact, RawPort};
use crate::{ScanError, ScanResult};
use serde::Deserialize;
use std::net::IpAddr;

#[derive(Debug, Deserialize)]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<Host>,
    pub runstats: Option<RunStats>,
}

#[derive(Debug, Deserialize)]
pub struct RunStats {
    pub finished: Option<Finished>,
}

#[derive(Debug, Deserialize)]
pub struct Finished {
    #[serde(rename = "@exit")]
    pub exit: Option<String>,
    #[serde(rename = "@errormsg")]
    pub errormsg: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Host {
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub status: Option<Status>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<Os>,
}

#[derive(Debug, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
}

#[derive(Debug, Deserialize)]
pub struct Status {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Deserialize)]
pub struct Port {
    #[serde(rename = "@portid")]
    pub portid: u16,
    #[serde(rename = "@protocol")]
    pub protocol: String,
    pub state: PortStateElement,
    pub service: Option<Service>,
}

#[derive(Debug, Deserialize)]
pub struct PortStateElement {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct Service {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Os {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatchElement>,
}

#[derive(Debug, Deserialize)]
pub struct OsMatchElement {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy", default)]
    pub accuracy: u8,
}

impl NmapRun {
    /// Decode an `-oX` report
    pub fn parse(xml: &str) -> ScanResult<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// Error message nmap recorded in `<runstats><finished exit="error">`
    pub fn run_error(&self) -> Option<String> {
        let finished = self.runstats.as_ref()?.finished.as_ref()?;
        match finished.exit.as_deref() {
            Some("error") => Some(
                finished
                    .errormsg
                    .clone()
                    .unwrap_or_else(|| "nmap reported an error".to_string()),
            ),
            _ => None,
        }
    }

    /// Convert the report into engine-neutral host facts
    pub fn into_facts(self) -> Vec<RawHostFact> {
        self.hosts.into_iter().map(Host::into_fact).collect()
    }
}

impl Host {
    fn into_fact(self) -> RawHostFact {
        let status = self
            .status
            .map(|s| s.state.parse().unwrap_or(HostStatus::Unknown))
            .unwrap_or(HostStatus::Unknown);

        // MAC entries share the <address> element; only IPs are addressable
        let addresses = self
            .addresses
            .iter()
            .filter(|a| a.addr_type == "ipv4" || a.addr_type == "ipv6")
            .filter_map(|a| match a.addr.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    log::debug!("Ignoring unparsable address {}", a.addr);
                    None
                }
            })
            .collect();

        let hostnames = self
            .hostnames
            .map(|h| h.hostnames.into_iter().map(|n| n.name).collect())
            .unwrap_or_default();

        let os_matches = self
            .os
            .map(|os| {
                os.matches
                    .into_iter()
                    .map(|m| OsMatch {
                        name: m.name,
                        accuracy: m.accuracy,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let ports = self
            .ports
            .map(|p| {
                p.ports
                    .into_iter()
                    .map(|port| RawPort {
                        port: port.portid,
                        state: port.state.state.parse().unwrap_or(PortState::Unknown),
                        service: port
                            .service
                            .map(|s| s.name)
                            .filter(|name| !name.is_empty()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        RawHostFact {
            addresses,
            status,
            hostnames,
            os_matches,
            ports,
        }
    }
}

/// Map a decode failure into the engine error the pipeline expects
pub(crate) fn engine_parse_error(err: ScanError) -> ScanError {
    match err {
        ScanError::Parse(msg) => ScanError::Engine(format!("unreadable nmap report: {}", msg)),
        other => other,
    }
}
