//! Station Capabilities
//!
//! Hardware collaborators are reached only through the small traits in this
//! module. Motion, I/O, measurement and imaging are separate capabilities so
//! that a test can replace one of them without touching the others.
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//!
//! Callers convert driver errors into [`crate::error::StationError`] with the
//! device context attached.

use crate::device::DeviceId;
use crate::position::{Axis, Position};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

// =============================================================================
// Motion
// =============================================================================

/// Capability: Multi-axis positioning
///
/// # Contract
/// - `move_to_absolute` and `move_relative` return once the move has settled
/// - `current_position` reports the full pose; gantry-class devices report
///   zero rotation
/// - `is_connected` is cheap and never fails
#[async_trait]
pub trait DeviceMovement: Send + Sync {
    /// Move `device` to an absolute pose.
    async fn move_to_absolute(&self, device: DeviceId, target: Position) -> Result<()>;

    /// Move `device` by `delta` along a single axis.
    async fn move_relative(&self, device: DeviceId, axis: Axis, delta: f64) -> Result<()>;

    /// Current pose of `device`.
    async fn current_position(&self, device: DeviceId) -> Result<Position>;

    /// True if the controller for `device` is reachable.
    async fn is_connected(&self, device: DeviceId) -> bool;
}

// =============================================================================
// Digital I/O
// =============================================================================

/// Direction of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinDirection {
    /// Sensor or switch read by the station
    Input,
    /// Line driven by the station
    Output,
}

/// Notification that a pin changed level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinStateChange {
    /// I/O board name
    pub device: String,
    /// Pin name on that board
    pub pin: String,
    /// Pin direction
    pub direction: PinDirection,
    /// New level
    pub state: bool,
}

/// Capability: Digital I/O boards
///
/// # Contract
/// - `set_output`/`clear_output` return `Ok(false)` when the board refused
///   the write, `Err` on transport failure
/// - `pin_state` returns `None` for pins the board does not know
/// - `subscribe` yields every level change, inputs and outputs alike
#[async_trait]
pub trait DigitalIo: Send + Sync {
    /// Drive an output high.
    async fn set_output(&self, device: &str, pin: &str) -> Result<bool>;

    /// Drive an output low.
    async fn clear_output(&self, device: &str, pin: &str) -> Result<bool>;

    /// Last known level of a pin.
    async fn pin_state(&self, device: &str, pin: &str, direction: PinDirection)
        -> Result<Option<bool>>;

    /// Stream of pin level changes.
    fn subscribe(&self) -> broadcast::Receiver<PinStateChange>;
}

// =============================================================================
// Measurement
// =============================================================================

/// One sample from a measurement channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReading {
    /// Scalar value
    pub value: f64,
    /// Unit label (e.g. "dBm", "V")
    pub unit: String,
    /// False while the instrument is ranging or saturated
    pub is_valid: bool,
}

/// Capability: Live scalar measurement
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Latest reading of `channel`, or `None` if nothing is available yet.
    ///
    /// Never blocks waiting for a fresh sample; callers poll.
    async fn try_channel_value(&self, channel: &str) -> Result<Option<ChannelReading>>;
}

// =============================================================================
// Imaging
// =============================================================================

/// Capability: Still image capture
#[async_trait]
pub trait ImageCapture: Send + Sync {
    /// Capture one image from `camera` and return the saved file path.
    async fn capture(&self, camera: &str, label: &str) -> Result<PathBuf>;
}
