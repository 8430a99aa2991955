//! Result aggregation - raw engine facts into target groups and host records
//!
//! Everything here is pure: the same facts and catalog always produce the
//! same groups and hosts, in the same order. Group order follows the first
//! appearance of each job in the facts; target and host order follow the
//! order hosts and ports were reported.

use crate::catalog::TargetCatalog;
use crate::engine::{PortState, RawHostFact};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};

/// Label key that always carries the group's job
pub const JOB_LABEL: &str = "job";

/// One entry of the service-discovery document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl ServiceTargetGroup {
    pub fn job(&self) -> Option<&str> {
        self.labels.get(JOB_LABEL).map(String::as_str)
    }
}

/// A reported port that was not closed or filtered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub port: u16,
    pub state: PortState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// Descriptive record for the info page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    pub ports: Vec<PortRecord>,
}

/// How custom labels from several specs of the same job are combined
///
/// Contributing specs are always visited in catalog order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMergePolicy {
    /// The earliest spec keeps a key; later specs only add new keys
    #[default]
    FirstWins,
    /// The latest spec overwrites keys set by earlier ones
    LastWins,
}

impl std::str::FromStr for LabelMergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "first_wins" | "first" => Ok(LabelMergePolicy::FirstWins),
            "last_wins" | "last" => Ok(LabelMergePolicy::LastWins),
            _ => Err(format!("Unknown label merge policy: {}", s)),
        }
    }
}

/// Output of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub groups: Vec<ServiceTargetGroup>,
    pub hosts: Vec<HostRecord>,
}

/// Format a target the way Prometheus expects (`[v6]:port` for IPv6)
pub fn format_target(ip: IpAddr, port: u16) -> String {
    SocketAddr::new(ip, port).to_string()
}

/// Aggregate one cycle's facts
pub fn aggregate(
    facts: &[RawHostFact],
    catalog: &TargetCatalog,
    policy: LabelMergePolicy,
) -> Aggregation {
    Aggregation {
        groups: build_groups(facts, catalog, policy),
        hosts: build_hosts(facts),
    }
}

struct JobAccumulator<'a> {
    job: &'a str,
    targets: Vec<String>,
    seen: HashSet<String>,
    // catalog positions, so label merging never depends on fact order
    contributors: BTreeSet<usize>,
}

/// Group open, catalogued ports by job
pub fn build_groups(
    facts: &[RawHostFact],
    catalog: &TargetCatalog,
    policy: LabelMergePolicy,
) -> Vec<ServiceTargetGroup> {
    let mut jobs: Vec<JobAccumulator<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for fact in facts {
        let Some(ip) = fact.primary_address() else {
            log::debug!("Skipping host with no addresses");
            continue;
        };

        for port in &fact.ports {
            if port.state != PortState::Open {
                continue;
            }
            let Some(position) = catalog.position(port.port) else {
                continue;
            };
            let Some(spec) = catalog.get(position) else {
                continue;
            };

            let slot = *index.entry(spec.job.as_str()).or_insert_with(|| {
                jobs.push(JobAccumulator {
                    job: spec.job.as_str(),
                    targets: Vec::new(),
                    seen: HashSet::new(),
                    contributors: BTreeSet::new(),
                });
                jobs.len() - 1
            });

            let acc = &mut jobs[slot];
            let target = format_target(ip, port.port);
            if acc.seen.insert(target.clone()) {
                log::debug!("Matched {} to job {} ({})", target, spec.job, spec.name);
                acc.targets.push(target);
            }
            acc.contributors.insert(position);
        }
    }

    jobs.into_iter()
        .filter(|acc| !acc.targets.is_empty())
        .map(|acc| ServiceTargetGroup {
            labels: merge_labels(catalog, acc.job, &acc.contributors, policy),
            targets: acc.targets,
        })
        .collect()
}

fn merge_labels(
    catalog: &TargetCatalog,
    job: &str,
    contributors: &BTreeSet<usize>,
    policy: LabelMergePolicy,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();

    for spec in contributors.iter().filter_map(|&i| catalog.get(i)) {
        for (key, value) in &spec.labels {
            if key == JOB_LABEL {
                log::debug!("Ignoring custom job label on port {}", spec.port);
                continue;
            }
            match policy {
                LabelMergePolicy::FirstWins => {
                    labels.entry(key.clone()).or_insert_with(|| value.clone());
                }
                LabelMergePolicy::LastWins => {
                    labels.insert(key.clone(), value.clone());
                }
            }
        }
    }

    labels.insert(JOB_LABEL.to_string(), job.to_string());
    labels
}

/// Describe every addressable host that has at least one visible port
pub fn build_hosts(facts: &[RawHostFact]) -> Vec<HostRecord> {
    facts
        .iter()
        .filter_map(|fact| {
            let ip = fact.primary_address()?;

            let ports: Vec<PortRecord> = fact
                .ports
                .iter()
                .filter(|p| !p.state.is_excluded())
                .map(|p| PortRecord {
                    port: p.port,
                    state: p.state,
                    service: p.service.clone(),
                })
                .collect();

            if ports.is_empty() {
                log::debug!("No visible ports on {}, dropping host", ip);
                return None;
            }

            Some(HostRecord {
                ip,
                hostname: fact.hostnames.first().cloned(),
                // engine orders matches by confidence
                os: fact.os_matches.first().map(|m| m.name.clone()),
                ports,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PortSpec;
    use crate::engine::HostStatus;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn scenario() -> (Vec<RawHostFact>, TargetCatalog) {
        let catalog = TargetCatalog::load(Some(vec![
            PortSpec::new(80, "http", "web"),
            PortSpec::new(9182, "windows_exporter", "node"),
        ]));
        let facts = vec![
            RawHostFact::up(ip("10.0.0.5"))
                .with_port(80, PortState::Open, Some("http"))
                .with_port(9182, PortState::Closed, None),
            RawHostFact::up(ip("10.0.0.9"))
                .with_port(80, PortState::Open, Some("http"))
                .with_port(9182, PortState::Open, Some("wsman")),
        ];
        (facts, catalog)
    }

    #[test]
    fn concrete_web_and_node_scenario() {
        let (facts, catalog) = scenario();
        let result = aggregate(&facts, &catalog, LabelMergePolicy::default());

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].job(), Some("web"));
        assert_eq!(result.groups[0].targets, vec!["10.0.0.5:80", "10.0.0.9:80"]);
        assert_eq!(result.groups[1].job(), Some("node"));
        assert_eq!(result.groups[1].targets, vec!["10.0.0.9:9182"]);

        assert_eq!(result.hosts.len(), 2);
        assert_eq!(result.hosts[0].ip, ip("10.0.0.5"));
        assert_eq!(
            result.hosts[0].ports,
            vec![PortRecord {
                port: 80,
                state: PortState::Open,
                service: Some("http".to_string()),
            }]
        );
        assert_eq!(result.hosts[1].ports.len(), 2);
    }

    #[test]
    fn unmatched_jobs_produce_no_group() {
        let catalog = TargetCatalog::load(Some(vec![
            PortSpec::new(80, "http", "web"),
            PortSpec::new(5432, "postgres", "db"),
        ]));
        let facts = vec![RawHostFact::up(ip("10.0.0.5")).with_port(80, PortState::Open, None)];
        let groups = build_groups(&facts, &catalog, LabelMergePolicy::FirstWins);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].job(), Some("web"));
    }

    #[test]
    fn only_exactly_open_ports_become_targets() {
        let catalog = TargetCatalog::load(Some(vec![PortSpec::new(80, "http", "web")]));
        let facts = vec![RawHostFact::up(ip("10.0.0.5")).with_port(80, PortState::OpenFiltered, None)];
        let result = aggregate(&facts, &catalog, LabelMergePolicy::FirstWins);
        assert!(result.groups.is_empty());
        // open|filtered is still visible on the host record
        assert_eq!(result.hosts.len(), 1);
    }

    #[test]
    fn uncatalogued_open_ports_are_ignored_for_groups() {
        let catalog = TargetCatalog::load(Some(vec![PortSpec::new(80, "http", "web")]));
        let facts = vec![RawHostFact::up(ip("10.0.0.5")).with_port(22, PortState::Open, Some("ssh"))];
        let result = aggregate(&facts, &catalog, LabelMergePolicy::FirstWins);
        assert!(result.groups.is_empty());
        assert_eq!(result.hosts[0].ports[0].port, 22);
    }

    #[test]
    fn hosts_without_address_are_skipped() {
        let catalog = TargetCatalog::load(Some(vec![PortSpec::new(80, "http", "web")]));
        let facts = vec![RawHostFact::new(HostStatus::Up).with_port(80, PortState::Open, None)];
        let result = aggregate(&facts, &catalog, LabelMergePolicy::FirstWins);
        assert!(result.groups.is_empty());
        assert!(result.hosts.is_empty());
    }

    #[test]
    fn closed_and_filtered_only_host_is_dropped() {
        let facts = vec![RawHostFact::up(ip("10.0.0.5"))
            .with_port(80, PortState::Closed, None)
            .with_port(443, PortState::Filtered, None)];
        assert!(build_hosts(&facts).is_empty());
    }

    #[test]
    fn host_record_uses_first_hostname_and_best_os() {
        let facts = vec![RawHostFact::up(ip("10.0.0.9"))
            .with_hostname("win-01.corp")
            .with_hostname("win-01")
            .with_os("Microsoft Windows Server 2019", 96)
            .with_os("Microsoft Windows 10", 93)
            .with_port(80, PortState::Open, Some("http"))];
        let hosts = build_hosts(&facts);
        assert_eq!(hosts[0].hostname.as_deref(), Some("win-01.corp"));
        assert_eq!(hosts[0].os.as_deref(), Some("Microsoft Windows Server 2019"));
    }

    #[test]
    fn duplicate_catalog_port_goes_to_first_job() {
        let catalog = TargetCatalog::load(Some(vec![
            PortSpec::new(80, "http", "web"),
            PortSpec::new(80, "http", "legacy"),
        ]));
        let facts = vec![RawHostFact::up(ip("10.0.0.5")).with_port(80, PortState::Open, None)];
        let groups = build_groups(&facts, &catalog, LabelMergePolicy::FirstWins);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].job(), Some("web"));
    }

    fn shared_job_catalog() -> TargetCatalog {
        TargetCatalog::load(Some(vec![
            PortSpec::new(80, "http", "web")
                .with_label("env", "prod")
                .with_label("tier", "frontend"),
            PortSpec::new(8080, "http-proxy", "web")
                .with_label("env", "staging")
                .with_label("proxy", "true"),
        ]))
    }

    #[test]
    fn first_wins_keeps_earliest_catalog_value() {
        // port 8080 is reported first, but 80 comes first in the catalog
        let facts = vec![RawHostFact::up(ip("10.0.0.5"))
            .with_port(8080, PortState::Open, None)
            .with_port(80, PortState::Open, None)];
        let groups = build_groups(&facts, &shared_job_catalog(), LabelMergePolicy::FirstWins);

        let labels = &groups[0].labels;
        assert_eq!(labels["env"], "prod");
        assert_eq!(labels["tier"], "frontend");
        assert_eq!(labels["proxy"], "true");
        assert_eq!(labels["job"], "web");
        assert_eq!(groups[0].targets, vec!["10.0.0.5:8080", "10.0.0.5:80"]);
    }

    #[test]
    fn last_wins_keeps_latest_catalog_value() {
        let facts = vec![RawHostFact::up(ip("10.0.0.5"))
            .with_port(80, PortState::Open, None)
            .with_port(8080, PortState::Open, None)];
        let groups = build_groups(&facts, &shared_job_catalog(), LabelMergePolicy::LastWins);
        assert_eq!(groups[0].labels["env"], "staging");
        assert_eq!(groups[0].labels["tier"], "frontend");
    }

    #[test]
    fn labels_only_come_from_matched_specs() {
        let facts = vec![RawHostFact::up(ip("10.0.0.5")).with_port(8080, PortState::Open, None)];
        let groups = build_groups(&facts, &shared_job_catalog(), LabelMergePolicy::FirstWins);
        assert_eq!(groups[0].labels["env"], "staging");
        assert!(!groups[0].labels.contains_key("tier"));
    }

    #[test]
    fn custom_job_label_cannot_override_job() {
        let catalog = TargetCatalog::load(Some(vec![
            PortSpec::new(80, "http", "web").with_label("job", "hijacked"),
        ]));
        let facts = vec![RawHostFact::up(ip("10.0.0.5")).with_port(80, PortState::Open, None)];
        let groups = build_groups(&facts, &catalog, LabelMergePolicy::LastWins);
        assert_eq!(groups[0].job(), Some("web"));
    }

    #[test]
    fn repeated_host_does_not_duplicate_targets() {
        let catalog = TargetCatalog::load(Some(vec![PortSpec::new(80, "http", "web")]));
        let host = RawHostFact::up(ip("10.0.0.5")).with_port(80, PortState::Open, None);
        let groups = build_groups(&[host.clone(), host], &catalog, LabelMergePolicy::FirstWins);
        assert_eq!(groups[0].targets, vec!["10.0.0.5:80"]);
    }

    #[test]
    fn ipv6_targets_are_bracketed() {
        assert_eq!(format_target(ip("fd00::5"), 9182), "[fd00::5]:9182");
        assert_eq!(format_target(ip("10.0.0.5"), 80), "10.0.0.5:80");
    }

    #[test]
    fn merge_policy_parses_from_config_strings() {
        assert_eq!("first_wins".parse::<LabelMergePolicy>().unwrap(), LabelMergePolicy::FirstWins);
        assert_eq!("last-wins".parse::<LabelMergePolicy>().unwrap(), LabelMergePolicy::LastWins);
        assert!("random".parse::<LabelMergePolicy>().is_err());
    }

    #[test]
    fn document_shape_matches_http_sd() {
        let (facts, catalog) = scenario();
        let result = aggregate(&facts, &catalog, LabelMergePolicy::FirstWins);
        let json = serde_json::to_string(&result.groups).unwrap();
        assert_eq!(
            json,
            r#"[{"targets":["10.0.0.5:80","10.0.0.9:80"],"labels":{"job":"web"}},{"targets":["10.0.0.9:9182"],"labels":{"job":"node"}}]"#
        );
    }
}
