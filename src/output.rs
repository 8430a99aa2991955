//! File publisher - writes the discovery document for `file_sd` consumers

use crate::aggregate::ServiceTargetGroup;
use crate::ScanResult;
use std::path::{Path, PathBuf};

/// Render the discovery document exactly as the HTTP endpoint serves it
pub fn render_document(groups: &[ServiceTargetGroup]) -> ScanResult<String> {
    Ok(serde_json::to_string_pretty(groups)?)
}

/// Writes the document to a file after each successful cycle
///
/// The file is written next to its destination and renamed into place, so
/// a watcher never reads a half-written document.
#[derive(Debug, Clone)]
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn publish(&self, groups: &[ServiceTargetGroup]) -> ScanResult<()> {
        let document = render_document(groups)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "targets.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, document.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        log::debug!("Wrote {} service groups to {}", groups.len(), self.path.display());
        Ok(())
    }
}
