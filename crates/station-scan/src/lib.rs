//! # station-scan
//!
//! Optical alignment by hill climbing over a live measurement channel.
//!
//! - [`parameters`]: `ScanningParameters` and their validation
//! - [`measurement`]: polling acquisition with timeout
//! - [`algorithm`]: the peak search session
//! - [`peak`], [`statistics`], [`record`]: session data
//! - [`progress`]: broadcast progress events
//! - [`storage`]: JSON and in-memory persistence
//! - [`command`]: the search wrapped as a station command

pub mod algorithm;
pub mod command;
pub mod measurement;
pub mod parameters;
pub mod peak;
pub mod progress;
pub mod record;
pub mod statistics;
pub mod storage;

pub use algorithm::{DirectionResult, PeakSearch, StopReason};
pub use command::ScanCommand;
pub use measurement::MeasurementReader;
pub use parameters::ScanningParameters;
pub use peak::{PeakData, ScanDirection, ScanMeasurement};
pub use progress::ScanProgress;
pub use record::{ScanOutcome, ScanSessionRecord, ScanStatus};
pub use statistics::ScanStatistics;
pub use storage::{JsonFileStorage, MemoryStorage, ScanStorage};
