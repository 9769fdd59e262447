//! # station-bin
//!
//! Library half of the `station` command: logging setup and the wiring of
//! configuration, simulators and executors shared by every subcommand.

pub mod app;
pub mod tracing_init;

pub use app::StationApp;
