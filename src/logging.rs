//! Logger setup for the service

use log::LevelFilter;

const KNOWN_LEVELS: [&str; 4] = ["DEBUG", "INFO", "WARN", "ERROR"];

pub struct Logger;

impl Logger {
    /// Initialize logger with the configured level name
    ///
    /// `RUST_LOG` is still honored for module filters. Does nothing if a
    /// logger is already installed, e.g. by an embedding application.
    pub fn init(level: &str) {
        let _ = env_logger::Builder::from_default_env()
            .filter_level(parse_level(level))
            .format_timestamp_secs()
            .try_init();
    }

    /// Log the effective settings once at startup
    pub fn log_startup(cidr: &str, ports: &str, interval_minutes: i64) {
        log::info!(
            "Starting network discovery for {} on ports {} every {} minute(s)",
            cidr,
            ports,
            interval_minutes
        );
    }
}

/// Map a level name to a filter; anything unrecognized means `Info`
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub(crate) fn is_known_level(level: &str) -> bool {
    KNOWN_LEVELS.contains(&level)
}
