//! Single-file JSON snapshot of the most recent aggregate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::AggregateResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub key: String,
    pub data: AggregateResult,
    /// Milliseconds since the epoch.
    pub updated_at: i64,
}

/// Best-effort persistence: every failure is logged and reported as a miss.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFile {
    path: Option<PathBuf>,
}

impl SnapshotFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn load(&self) -> Option<SnapshotRecord> {
        let path = self.path.as_ref()?;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read aggregate snapshot {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring unreadable aggregate snapshot {}: {}", path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, record: &SnapshotRecord) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if let Err(e) = write_atomic(path, record).await {
            warn!("Failed to write aggregate snapshot {}: {:#}", path.display(), e);
        } else {
            debug!("Aggregate snapshot written for key {}", record.key);
        }
    }

    pub async fn remove(&self) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed aggregate snapshot {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove aggregate snapshot {}: {}", path.display(), e),
        }
    }
}

async fn write_atomic(path: &Path, record: &SnapshotRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_vec(record)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
