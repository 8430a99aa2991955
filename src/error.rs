//! Error handling for the discovery pipeline
//!
//! A failed cycle never reaches API consumers: the scheduler logs it and the
//! cache keeps serving the previous snapshot.

use std::time::Duration;
use thiserror::Error;

/// Main error type for discovery operations
#[derive(Debug, Error)]
pub enum ScanError {
    /// The probing engine could not be started or its run failed outright.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The cycle's shared deadline elapsed mid-phase.
    #[error("Scan cycle timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ScanError {
    /// Errors that abort a cycle but are expected to clear on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Engine(_) | ScanError::Timeout(_))
    }
}

impl From<quick_xml::DeError> for ScanError {
    fn from(err: quick_xml::DeError) -> Self {
        ScanError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Parse(err.to_string())
    }
}

/// Result type alias for discovery operations
pub type ScanResult<T> = Result<T, ScanError>;
