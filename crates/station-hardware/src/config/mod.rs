//! Station configuration module.
//!
//! # Architecture
//!
//! The configuration system consists of three layers:
//!
//! 1. **Schema** - Rust types for the station sections
//! 2. **Validation** - Cross-field rules (edge endpoints, slide pins, step sizes)
//! 3. **Loader** - Figment layering of defaults, TOML and environment
//!
//! # Sections
//!
//! - `[station]` - Station identity
//! - `[devices.<id>]` - Named positions and edges per positioning device
//! - `[io.pins.<name>]` - Logical pin map
//! - `[slides.<name>]` - Pneumatic slides
//! - `[scanning]` - Peak search defaults
//! - `[motion]` - Coordinated motion options
//! - `[storage]` - Scan session output
//! - `[logging]` - Log level and format
//! - `[simulation]` - Simulated driver behaviour

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_station_config, load_station_config_from_str, ConfigLoadError};
pub use schema::{
    DeviceConfig, EdgeConfig, IoConfig, LogFormat, LoggingConfig, MotionConfig,
    NamedPositionConfig, PinConfig, ScanningConfig, SimulationConfig, SlideConfig, StationConfig,
    StationIdentity, StorageConfig,
};
