//! Session records and outcomes.

use crate::parameters::ScanningParameters;
use crate::peak::{PeakData, ScanMeasurement};
use crate::statistics::ScanStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use station_core::{DeviceId, Position};
use std::path::PathBuf;
use uuid::Uuid;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// All step sizes and axes were scanned
    Completed,
    /// Cancelled by the caller
    Cancelled,
    /// Stopped by a hardware or measurement error
    Failed,
}

/// Everything persisted about one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSessionRecord {
    /// Scanned device
    pub device_id: DeviceId,
    /// Session identifier
    pub scan_id: Uuid,
    /// Session start
    pub start_time: DateTime<Utc>,
    /// Session end
    pub end_time: DateTime<Utc>,
    /// Final status
    pub status: ScanStatus,
    /// Error message when not completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unit of the measured values
    pub unit: String,
    /// First measurement
    pub baseline: PeakData,
    /// Best measurement
    pub peak: PeakData,
    /// Every sample in order
    pub measurements: Vec<ScanMeasurement>,
    /// Aggregates over `measurements`
    pub statistics: ScanStatistics,
    /// Parameters the session ran with
    pub parameters: ScanningParameters,
}

/// Result handed back to the caller of a completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Session identifier
    pub scan_id: Uuid,
    /// First measurement
    pub baseline: PeakData,
    /// Best measurement
    pub peak: PeakData,
    /// Aggregates over the log
    pub statistics: ScanStatistics,
    /// Pose the device was left at
    pub final_position: Position,
    /// Where the record was persisted
    pub record_path: PathBuf,
}
