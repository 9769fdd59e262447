//! Station configuration schema.
//!
//! The schema describes everything the station needs at startup:
//!
//! - Named positions and legal transitions per positioning device
//! - The digital I/O pin map
//! - Pneumatic slides
//! - Scanning defaults and the measurement channel
//! - Scan storage location
//! - Simulation parameters for the simulated drivers
//!
//! # Example
//!
//! ```toml
//! [station]
//! name = "bonding-cell-2"
//!
//! [devices.gantry]
//! positions = [
//!     { name = "Home", position = { x = 0.0, y = 0.0, z = 0.0 } },
//!     { name = "Load", position = { x = 120.0, y = 5.0, z = 0.0 } },
//! ]
//! edges = [{ from = "Home", to = "Load", weight = 1.0 }]
//!
//! [io.pins.dispense_valve]
//! device = "io-main"
//! pin = "DO3"
//! direction = "output"
//! ```

use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use station_core::limits::{
    INPUT_WAIT_TIMEOUT, MEASUREMENT_POLL_INTERVAL, MEASUREMENT_TIMEOUT, SLIDE_CONFIRM_TIMEOUT,
};
use station_core::{Axis, DeviceId, PinDirection, Position};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::validation::validate_name;

// =============================================================================
// Top-Level Config
// =============================================================================

/// Complete station configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    /// Station identity
    #[serde(default)]
    #[validate]
    pub station: StationIdentity,

    /// Named positions and transitions per positioning device
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, DeviceConfig>,

    /// Digital I/O pin map
    #[serde(default)]
    pub io: IoConfig,

    /// Pneumatic slides by name
    #[serde(default)]
    pub slides: BTreeMap<String, SlideConfig>,

    /// Default scanning parameters
    #[serde(default)]
    #[validate]
    pub scanning: ScanningConfig,

    /// Coordinated motion options
    #[serde(default)]
    pub motion: MotionConfig,

    /// Scan session storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging options
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Behaviour of the simulated drivers
    #[serde(default)]
    #[validate]
    pub simulation: SimulationConfig,
}

/// Station identity.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StationIdentity {
    /// Station name
    #[validate(min_length = 1)]
    #[validate(max_length = 100)]
    pub name: String,

    /// Free-form description
    #[serde(default)]
    #[validate(max_length = 500)]
    pub description: String,
}

impl Default for StationIdentity {
    fn default() -> Self {
        Self {
            name: "assembly-station".to_string(),
            description: String::new(),
        }
    }
}

// =============================================================================
// Positioning Devices
// =============================================================================

/// Named positions and legal transitions of one positioning device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Named positions in declaration order
    #[serde(default)]
    #[validate]
    pub positions: Vec<NamedPositionConfig>,

    /// Undirected transitions between named positions
    #[serde(default)]
    #[validate]
    pub edges: Vec<EdgeConfig>,
}

/// A named pose.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NamedPositionConfig {
    /// Position name, unique per device
    #[validate(custom(validate_name))]
    pub name: String,

    /// Absolute pose
    pub position: Position,
}

/// One undirected transition.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EdgeConfig {
    /// Start position name
    #[validate(min_length = 1)]
    pub from: String,

    /// End position name
    #[validate(min_length = 1)]
    pub to: String,

    /// Traversal cost
    #[serde(default = "default_edge_weight")]
    #[validate(minimum = 0.0)]
    pub weight: f64,
}

fn default_edge_weight() -> f64 {
    1.0
}

// =============================================================================
// Digital I/O
// =============================================================================

/// Digital I/O pin map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Logical pin name -> physical location
    #[serde(default)]
    pub pins: BTreeMap<String, PinConfig>,
}

/// Physical location of a logical pin.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PinConfig {
    /// I/O board name
    #[validate(min_length = 1)]
    pub device: String,

    /// Pin name on the board
    #[validate(min_length = 1)]
    pub pin: String,

    /// Pin direction
    pub direction: PinDirection,
}

// =============================================================================
// Pneumatic Slides
// =============================================================================

/// A pneumatic slide: one output valve and two end-of-travel sensors.
///
/// All three fields name logical pins from [`IoConfig::pins`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SlideConfig {
    /// Output pin driving the valve
    #[validate(min_length = 1)]
    pub output: String,

    /// Input pin high when retracted
    #[validate(min_length = 1)]
    pub up_sensor: String,

    /// Input pin high when extended
    #[validate(min_length = 1)]
    pub down_sensor: String,

    /// Setting the output extends the slide when true; clearing it does otherwise
    #[serde(default = "default_true")]
    pub active_high: bool,

    /// Time allowed for the sensors to confirm the target state
    #[serde(default = "default_slide_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_true() -> bool {
    true
}

fn default_slide_timeout() -> Duration {
    SLIDE_CONFIRM_TIMEOUT
}

// =============================================================================
// Scanning
// =============================================================================

/// Default parameters of the peak search.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ScanningConfig {
    /// Measurement channel to maximize
    #[validate(min_length = 1)]
    pub channel: String,

    /// Axes scanned in order
    #[validate(min_items = 1)]
    pub axes: Vec<Axis>,

    /// Step sizes, coarse to fine
    #[validate(min_items = 1)]
    pub step_sizes: Vec<f64>,

    /// Largest permitted step size
    #[validate(exclusive_minimum = 0.0)]
    pub max_step_size: f64,

    /// Dwell after each move before measuring
    #[serde(with = "humantime_serde")]
    pub settle_time: Duration,

    /// Consecutive non-improving samples that end a direction
    #[validate(minimum = 1)]
    pub consecutive_decreases_limit: u32,

    /// Relative drop from the global peak that triggers a return to it
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub improvement_threshold: f64,

    /// Relative drop between consecutive samples that ends a direction
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub significant_decrease_threshold: f64,

    /// Maximum travel per direction
    #[validate(exclusive_minimum = 0.0)]
    pub max_total_distance: f64,

    /// Time allowed to obtain one valid reading
    #[serde(with = "humantime_serde")]
    pub measurement_timeout: Duration,

    /// Interval between reading attempts
    #[serde(with = "humantime_serde")]
    pub measurement_poll_interval: Duration,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            channel: "optical_power".to_string(),
            axes: vec![Axis::X, Axis::Y, Axis::Z],
            step_sizes: vec![0.01, 0.005, 0.001],
            max_step_size: 0.05,
            settle_time: Duration::from_millis(50),
            consecutive_decreases_limit: 3,
            improvement_threshold: 0.05,
            significant_decrease_threshold: 0.05,
            max_total_distance: 0.5,
            measurement_timeout: MEASUREMENT_TIMEOUT,
            measurement_poll_interval: MEASUREMENT_POLL_INTERVAL,
        }
    }
}

// =============================================================================
// Coordinated Motion
// =============================================================================

/// Coordinated motion options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotionConfig {
    /// Default time allowed for wait-for-input commands
    #[serde(with = "humantime_serde")]
    pub input_wait_timeout: Duration,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            input_wait_timeout: INPUT_WAIT_TIMEOUT,
        }
    }
}

// =============================================================================
// Storage & Logging
// =============================================================================

/// Where scan sessions are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory; one subdirectory per device
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/scans"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line human output
    #[default]
    Pretty,
    /// Single-line human output
    Compact,
    /// One JSON object per event
    Json,
}

/// Logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// =============================================================================
// Simulation
// =============================================================================

/// Parameters of the simulated drivers.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Time each simulated move takes
    #[serde(with = "humantime_serde")]
    pub move_latency: Duration,

    /// Time a simulated slide takes between end sensors
    #[serde(with = "humantime_serde")]
    pub slide_travel: Duration,

    /// Device whose pose drives the simulated optical signal
    pub coupling_device: DeviceId,

    /// Pose of maximum coupling
    #[serde(default)]
    pub optimum: Position,

    /// Signal at the optimum
    #[validate(exclusive_minimum = 0.0)]
    pub peak_value: f64,

    /// Gaussian width over translation (length units)
    #[validate(exclusive_minimum = 0.0)]
    pub beam_waist: f64,

    /// Gaussian width over rotation (degrees)
    #[validate(exclusive_minimum = 0.0)]
    pub angular_width: f64,

    /// Standard deviation of additive noise, relative to peak
    #[validate(minimum = 0.0)]
    pub noise: f64,

    /// Unit label reported by the simulated channel
    pub unit: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            move_latency: Duration::from_millis(5),
            slide_travel: Duration::from_millis(100),
            coupling_device: DeviceId::Hexapod(station_core::HexapodLocation::Left),
            optimum: Position::ORIGIN,
            peak_value: 1.0,
            beam_waist: 0.05,
            angular_width: 0.5,
            noise: 0.0,
            unit: "mW".to_string(),
        }
    }
}

impl StationConfig {
    /// Logical names of the configured positioning devices.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }
}
