//! Nmap adapter - runs the nmap binary and parses its XML report

use super::xml::{engine_parse_error, NmapRun};
use super::{ProbeEngine, ProbeMode, ProbeRequest, RawScanResult};
use crate::{ScanError, ScanResult};
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Nmap-specific configuration
#[derive(Debug, Clone)]
pub struct NmapConfig {
    /// Path to nmap binary
    pub nmap_path: String,
    /// Ask for OS fingerprints during service detection (requires root)
    pub os_detection: bool,
    /// Timing template (0-5)
    pub timing_template: u8,
    /// Extra arguments appended before the targets
    pub extra_args: Vec<String>,
}

impl Default for NmapConfig {
    fn default() -> Self {
        Self {
            nmap_path: "nmap".to_string(),
            os_detection: true,
            timing_template: 4,
            extra_args: Vec::new(),
        }
    }
}

/// [`ProbeEngine`] backed by the nmap command line tool
pub struct NmapEngine {
    config: NmapConfig,
}

impl NmapEngine {
    pub fn new(config: NmapConfig) -> Self {
        Self { config }
    }

    /// Build the argument vector for one request
    pub fn build_args(&self, request: &ProbeRequest) -> Vec<String> {
        let mut args = Vec::new();

        match request.mode {
            ProbeMode::Liveness => {
                args.push("-sn".to_string());
            }
            ProbeMode::ServiceDetection => {
                args.push("-sV".to_string());
                if self.config.os_detection {
                    args.push("-O".to_string());
                }
                if !request.ports.is_empty() {
                    args.push("-p".to_string());
                    args.push(
                        request
                            .ports
                            .iter()
                            .map(|p| p.to_string())
                            .collect::<Vec<_>>()
                            .join(","),
                    );
                }
            }
        }

        args.push(format!("-T{}", self.config.timing_template.min(5)));

        // XML report on stdout
        args.push("-oX".to_string());
        args.push("-".to_string());

        args.extend(self.config.extra_args.iter().cloned());
        args.extend(request.targets.iter().cloned());
        args
    }

    /// Run nmap; the child is killed if this future is dropped
    async fn execute_nmap_command(&self, args: &[String]) -> ScanResult<CommandOutput> {
        let output = Command::new(&self.config.nmap_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScanError::Engine(format!("failed to execute {}: {}", self.config.nmap_path, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
        })
    }
}

impl Default for NmapEngine {
    fn default() -> Self {
        Self::new(NmapConfig::default())
    }
}

#[async_trait]
impl ProbeEngine for NmapEngine {
    async fn probe(&self, request: &ProbeRequest) -> ScanResult<RawScanResult> {
        if request.targets.is_empty() {
            return Err(ScanError::Engine("no targets given to nmap".to_string()));
        }

        let args = self.build_args(request);
        debug!("Executing nmap ({}) with args: {:?}", request.mode.as_str(), args);

        let start = Instant::now();
        let output = self.execute_nmap_command(&args).await?;
        debug!(
            "nmap {} run finished in {:.2}s",
            request.mode.as_str(),
            start.elapsed().as_secs_f64()
        );

        parse_report(output)
    }

    fn name(&self) -> &str {
        "nmap"
    }
}

/// Command execution output
#[derive(Debug)]
struct CommandOutput {
    stdout: String,
    stderr: String,
    success: bool,
    exit_code: Option<i32>,
}

fn parse_report(output: CommandOutput) -> ScanResult<RawScanResult> {
    let warnings: Vec<String> = output
        .stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if !output.success {
        let code = output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(ScanError::Engine(format!(
            "nmap exited with status {}: {}",
            code,
            warnings.join("; ")
        )));
    }

    let run = NmapRun::parse(&output.stdout).map_err(engine_parse_error)?;
    if let Some(msg) = run.run_error() {
        return Err(ScanError::Engine(msg));
    }

    Ok(RawScanResult {
        hosts: run.into_facts(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn liveness_args() {
        let engine = NmapEngine::default();
        let args = engine.build_args(&ProbeRequest::liveness("10.0.0.0/24"));
        assert_eq!(args, vec!["-sn", "-T4", "-oX", "-", "10.0.0.0/24"]);
    }

    #[test]
    fn service_detection_args() {
        let engine = NmapEngine::new(NmapConfig {
            os_detection: false,
            ..NmapConfig::default()
        });
        let hosts: Vec<IpAddr> = vec!["10.0.0.5".parse().unwrap()];
        let args = engine.build_args(&ProbeRequest::service_detection(&hosts, vec![80, 9182]));
        assert_eq!(args, vec!["-sV", "-p", "80,9182", "-T4", "-oX", "-", "10.0.0.5"]);
    }

    #[test]
    fn os_detection_adds_flag() {
        let engine = NmapEngine::default();
        let hosts: Vec<IpAddr> = vec!["10.0.0.5".parse().unwrap()];
        let args = engine.build_args(&ProbeRequest::service_detection(&hosts, vec![80]));
        assert!(args.contains(&"-O".to_string()));
    }

    #[test]
    fn non_zero_exit_is_engine_error() {
        let result = parse_report(CommandOutput {
            stdout: String::new(),
            stderr: "TCP/IP fingerprinting (for OS scan) requires root privileges.\nQUITTING!\n".to_string(),
            success: false,
            exit_code: Some(1),
        });
        match result {
            Err(ScanError::Engine(msg)) => assert!(msg.contains("requires root")),
            other => panic!("expected engine error, got {:?}", other),
        }
    }

    #[test]
    fn stderr_on_success_becomes_warnings() {
        let result = parse_report(CommandOutput {
            stdout: "<nmaprun><runstats><finished exit=\"success\"/></runstats></nmaprun>".to_string(),
            stderr: "Failed to resolve \"nosuchhost\".\n".to_string(),
            success: true,
            exit_code: Some(0),
        })
        .unwrap();
        assert!(result.hosts.is_empty());
        assert_eq!(result.warnings, vec!["Failed to resolve \"nosuchhost\"."]);
    }

    #[tokio::test]
    async fn missing_binary_is_engine_error() {
        let engine = NmapEngine::new(NmapConfig {
            nmap_path: "/nonexistent/nmap-sd-test-binary".to_string(),
            ..NmapConfig::default()
        });
        let err = engine
            .probe(&ProbeRequest::liveness("127.0.0.1/32"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Engine(_)));
    }
}
