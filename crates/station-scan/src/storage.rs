//! Session persistence.
//!
//! [`JsonFileStorage`] writes one pretty-printed JSON document per session:
//!
//! ```text
//! <root>/<device>/<device>_<YYYYmmdd_HHMMSS>_<scan-id>.json
//! ```
//!
//! Existing files are never overwritten.

use crate::record::ScanSessionRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use station_core::{StationError, StationResult};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Destination for finished session records.
#[async_trait]
pub trait ScanStorage: Send + Sync {
    /// Persist `record`, returning where it was stored.
    async fn persist(&self, record: &ScanSessionRecord) -> StationResult<PathBuf>;
}

/// JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    /// Storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a record is written to.
    pub fn record_path(&self, record: &ScanSessionRecord) -> PathBuf {
        let device = record.device_id.as_str();
        self.root.join(device).join(format!(
            "{}_{}_{}.json",
            device,
            record.start_time.format("%Y%m%d_%H%M%S"),
            record.scan_id
        ))
    }
}

#[async_trait]
impl ScanStorage for JsonFileStorage {
    async fn persist(&self, record: &ScanSessionRecord) -> StationResult<PathBuf> {
        let path = self.record_path(record);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StationError::Storage(format!("serializing scan record: {}", e)))?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StationError::Storage(format!("{}: {}", path.display(), e)))?;
        file.write_all(&json).await?;
        file.flush().await?;

        info!(path = %path.display(), measurements = record.measurements.len(), "Scan record saved");
        Ok(path)
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<Vec<ScanSessionRecord>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records persisted so far.
    pub fn records(&self) -> Vec<ScanSessionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ScanStorage for MemoryStorage {
    async fn persist(&self, record: &ScanSessionRecord) -> StationResult<PathBuf> {
        self.records.lock().push(record.clone());
        Ok(PathBuf::from(format!("memory://{}", record.scan_id)))
    }
}
