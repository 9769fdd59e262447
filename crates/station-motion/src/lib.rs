//! # station-motion
//!
//! Named-position motion for the station:
//!
//! - [`registry`]: per-device named positions and current-position resolution
//! - [`graph`]: weighted undirected motion graph with Dijkstra queries
//! - [`planner`]: path analysis from the current pose to a named target
//! - [`coordinated`]: the tagged coordinated command model
//! - [`executor`]: grouped, resource-aware execution of coordinated commands
//! - [`commands`]: motion work wrapped as station commands

pub mod commands;
pub mod coordinated;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod registry;

pub use commands::{CoordinatedSequenceCommand, MoveToNamedPositionCommand};
pub use coordinated::{CoordinatedAction, CoordinatedCommand};
pub use executor::{CommandOutcome, CoordinatedExecutor, ExecutionReport};
pub use graph::MotionGraph;
pub use planner::{PathAnalysis, PathFailure, PathPlanner};
pub use registry::{NamedPosition, PositionRegistry, Resolution};
