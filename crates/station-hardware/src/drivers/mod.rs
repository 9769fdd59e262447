//! Simulated drivers.
//!
//! Every capability trait has a simulator here so the motion, scanning and
//! CLI layers run without hardware:
//!
//! - [`SimulatedMotion`]: hexapods and gantry with move latency and a move log
//! - [`SimulatedIo`]: pin table, change notifications, slide physics
//! - [`SimulatedMeasurement`]: Gaussian optical coupling over a device pose
//! - [`SimulatedCamera`]: records captures
//! - [`SimulatedStation`]: all of the above built from a `StationConfig`

mod camera;
mod io;
mod measurement;
mod motion;
mod station;

pub use camera::SimulatedCamera;
pub use io::SimulatedIo;
pub use measurement::{CouplingModel, SimulatedMeasurement};
pub use motion::{MoveKind, MoveRecord, SimulatedMotion};
pub use station::SimulatedStation;
