//! Peak and sample records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use station_core::{Axis, Position};
use std::fmt;

/// Direction of travel along a scanned axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    /// Increasing axis value
    Positive,
    /// Decreasing axis value
    Negative,
}

impl ScanDirection {
    /// `+1.0` or `-1.0`.
    pub fn sign(self) -> f64 {
        match self {
            ScanDirection::Positive => 1.0,
            ScanDirection::Negative => -1.0,
        }
    }
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanDirection::Positive => "+",
            ScanDirection::Negative => "-",
        })
    }
}

/// A measured value at a pose: the baseline or the best seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakData {
    /// Measured value
    pub value: f64,
    /// Pose it was measured at
    pub position: Position,
    /// When it was measured
    pub timestamp: DateTime<Utc>,
    /// Where in the session it was found
    pub context: String,
}

/// One sample of the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMeasurement {
    /// Measured value
    pub value: f64,
    /// Pose it was measured at
    pub position: Position,
    /// When it was measured
    pub timestamp: DateTime<Utc>,
    /// Axis being scanned, `None` for baseline and verification samples
    pub axis: Option<Axis>,
    /// Step size in use
    pub step_size: Option<f64>,
    /// Direction of travel
    pub direction: Option<ScanDirection>,
}

impl ScanMeasurement {
    /// Context label used when this sample becomes a peak.
    pub fn context(&self) -> String {
        match (self.axis, self.step_size, self.direction) {
            (Some(axis), Some(step), Some(direction)) => {
                format!("{}{} step {}", axis, direction, step)
            }
            (Some(axis), Some(step), None) => format!("{} step {} verify", axis, step),
            _ => "verify".to_string(),
        }
    }
}
