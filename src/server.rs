//! HTTP surface - discovery, info and health routes
//!
//! ```text
//! GET {scan_path}   - Prometheus http_sd document (JSON)
//! GET {info_path}   - host table (HTML)
//! GET /health       - readiness and cycle counter
//! ```
//!
//! Handlers only ever read the current snapshot; they never wait on a cycle.

use crate::aggregate::{HostRecord, ServiceTargetGroup};
use crate::cache::{RefreshCache, ScanSnapshot};
use crate::ScanResult;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use log::{debug, info};
use serde::Serialize;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shown on the info page until the first cycle succeeds
pub const PLACEHOLDER_HTML: &str = "<h1>Scanning in progress...</h1>";

pub const HEALTH_PATH: &str = "/health";

#[derive(Clone)]
pub struct ServerState {
    cache: Arc<RefreshCache>,
}

impl ServerState {
    pub fn new(cache: Arc<RefreshCache>) -> Self {
        Self { cache }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthInfo {
    pub status: &'static str,
    pub ready: bool,
    pub cycle: u64,
}

/// Build the router; paths are expected to be normalized already
pub fn router(cache: Arc<RefreshCache>, scan_path: &str, info_path: &str) -> Router {
    Router::new()
        .route(scan_path, get(handle_discovery))
        .route(info_path, get(handle_info))
        .route(HEALTH_PATH, get(handle_health))
        .with_state(ServerState::new(cache))
}

/// Serve `app` on `listen` until `shutdown` fires
pub async fn serve(app: Router, listen: SocketAddr, shutdown: CancellationToken) -> ScanResult<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

pub async fn handle_discovery(State(state): State<ServerState>) -> Json<Vec<ServiceTargetGroup>> {
    let snapshot = state.cache.snapshot();
    if !snapshot.ready {
        debug!("Discovery requested before first cycle, returning empty list");
        return Json(Vec::new());
    }
    Json(snapshot.groups.clone())
}

pub async fn handle_info(State(state): State<ServerState>) -> Html<String> {
    Html(render_info(&state.cache.snapshot()))
}

pub async fn handle_health(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.cache.snapshot();
    Json(HealthInfo {
        status: "ok",
        ready: snapshot.ready,
        cycle: snapshot.cycle,
    })
}

/// Render the info page for a snapshot
pub fn render_info(snapshot: &ScanSnapshot) -> String {
    if !snapshot.ready {
        return PLACEHOLDER_HTML.to_string();
    }

    let updated = snapshot
        .updated_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());

    let mut page = String::with_capacity(2048 + snapshot.hosts.len() * 256);
    page.push_str(INFO_HEAD);
    let _ = writeln!(page, "    <div class=\"timestamp\">Last updated: {}</div>", updated);

    if snapshot.hosts.is_empty() {
        page.push_str("    <div class=\"no-data\">No hosts found</div>\n");
    } else {
        page.push_str(
            "    <table>\n        <thead>\n            <tr><th>IP Address</th><th>Hostname</th><th>Operating System</th><th>Ports</th></tr>\n        </thead>\n        <tbody>\n",
        );
        for host in &snapshot.hosts {
            render_host_row(&mut page, host);
        }
        page.push_str("        </tbody>\n    </table>\n");
    }

    page.push_str("</body>\n</html>\n");
    page
}

fn render_host_row(page: &mut String, host: &HostRecord) {
    let hostname = host.hostname.as_deref().map(html_escape).unwrap_or_else(|| "-".to_string());
    let os = host.os.as_deref().map(html_escape).unwrap_or_else(|| "Unknown".to_string());

    let _ = writeln!(page, "            <tr>");
    let _ = writeln!(page, "                <td>{}</td>", host.ip);
    let _ = writeln!(page, "                <td>{}</td>", hostname);
    let _ = writeln!(page, "                <td>{}</td>", os);
    page.push_str("                <td><ul class=\"port-list\">\n");
    for port in &host.ports {
        let _ = write!(
            page,
            "                    <li class=\"port-item\"><strong>{}</strong> ({})",
            port.port, port.state
        );
        if let Some(service) = &port.service {
            let _ = write!(page, " - {}", html_escape(service));
        }
        page.push_str("</li>\n");
    }
    page.push_str("                </ul></td>\n            </tr>\n");
}

/// Escape text for use in HTML element content and attribute values
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const INFO_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Network Scan Results</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }
        h1 { color: #333; }
        table { width: 100%; border-collapse: collapse; background-color: white; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
        th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }
        th { background-color: #4CAF50; color: white; font-weight: bold; }
        tr:hover { background-color: #f5f5f5; }
        .port-list { margin: 0; padding-left: 20px; }
        .port-item { margin: 4px 0; }
        .no-data { text-align: center; padding: 40px; color: #666; }
        .timestamp { color: #666; font-size: 14px; margin-bottom: 20px; }
    </style>
</head>
<body>
    <h1>Network Scan Results</h1>
"#;
