//! Progress events broadcast while a session runs.

use crate::peak::ScanDirection;
use crate::record::ScanStatus;
use serde::Serialize;
use station_core::{Axis, DeviceId, Position};
use uuid::Uuid;

/// Capacity of the progress channel. Slow subscribers see `Lagged`.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// One session event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanProgress {
    /// Baseline recorded.
    Started {
        /// Session identifier
        scan_id: Uuid,
        /// Scanned device
        device: DeviceId,
        /// Baseline value
        baseline: f64,
    },
    /// A sample was recorded.
    Measurement {
        /// Zero-based sample index
        index: usize,
        /// Measured value
        value: f64,
        /// Axis being scanned
        axis: Option<Axis>,
        /// Direction of travel
        direction: Option<ScanDirection>,
    },
    /// The global peak improved.
    PeakUpdated {
        /// New peak value
        value: f64,
        /// Pose of the new peak
        position: Position,
    },
    /// All axes were scanned with one step size.
    StepSizeCompleted {
        /// Step size just finished
        step_size: f64,
        /// Peak value so far
        peak: f64,
    },
    /// The signal drifted below the peak and the device went back to it.
    ReturnedToPeak {
        /// Value before returning
        from_value: f64,
        /// Value measured at the peak pose
        verified_value: f64,
    },
    /// Session over.
    Finished {
        /// Final status
        status: ScanStatus,
        /// Peak value
        peak: f64,
    },
}
