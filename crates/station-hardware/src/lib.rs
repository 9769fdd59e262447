//! # station-hardware
//!
//! Everything between the station core and the physical cell:
//!
//! - [`config`]: the `StationConfig` schema and its Figment loader
//! - [`io`]: logical pin map, output writes, input waits and the pin-state cache
//! - [`slide`]: the pneumatic slide state machine
//! - [`drivers`]: simulated implementations of every capability trait

pub mod config;
pub mod drivers;
pub mod io;
pub mod slide;

pub use config::{load_station_config, load_station_config_from_str, ConfigLoadError, StationConfig};
pub use io::{IoPinMap, PinAddress, PinStateCache};
pub use slide::{PneumaticSlide, SlideOutcome, SlideState, SlideTarget};
