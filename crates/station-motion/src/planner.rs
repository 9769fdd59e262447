//! Path planning over named positions.
//!
//! [`PathPlanner`] resolves where a device currently is, finds the shortest
//! legal route to a named target and summarizes it as a [`PathAnalysis`].
//! Analysis never returns `Err`: every failure is reported as an invalid
//! analysis carrying a [`PathFailure`] and a message, so callers can show the
//! problem to an operator without unwinding.

use crate::graph::MotionGraph;
use crate::registry::{PositionRegistry, Resolution};
use serde::Serialize;
use station_core::{DeviceId, DeviceMovement, ErrorKind, StationError, StationResult};
use station_hardware::StationConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Why a path analysis is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathFailure {
    /// The device has no position table
    DeviceNotConfigured,
    /// The device has no motion graph
    NoGraph,
    /// The target is not a named position of the device
    UnknownTarget,
    /// The device has no named positions to resolve against
    NoNamedPositions,
    /// The device reports itself disconnected
    NotConnected,
    /// Reading the current position failed
    PositionUnavailable,
    /// No path connects the current and target positions
    Unreachable,
}

impl PathFailure {
    /// Error classification of this failure.
    pub fn kind(self) -> ErrorKind {
        match self {
            PathFailure::NotConnected => ErrorKind::Connectivity,
            PathFailure::PositionUnavailable => ErrorKind::Hardware,
            _ => ErrorKind::Configuration,
        }
    }
}

/// Result of planning a move to a named position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathAnalysis {
    /// Device the analysis was made for
    pub device: DeviceId,
    /// True if `path` can be executed
    pub is_valid: bool,
    /// Operator-facing error when invalid
    pub error: Option<String>,
    /// Classification of the error
    pub failure: Option<PathFailure>,
    /// Resolved current position, or the nearest one when `requires_initial_move`
    pub current_position_name: Option<String>,
    /// Requested target
    pub target_position_name: String,
    /// Named positions from current to target, inclusive
    pub path: Vec<String>,
    /// The device is off any named position and must first move to the nearest
    pub requires_initial_move: bool,
    /// Distance to that nearest position
    pub initial_move_distance: f64,
}

impl PathAnalysis {
    fn invalid(
        device: DeviceId,
        target: &str,
        failure: PathFailure,
        error: impl Into<String>,
    ) -> Self {
        Self {
            device,
            is_valid: false,
            error: Some(error.into()),
            failure: Some(failure),
            current_position_name: None,
            target_position_name: target.to_string(),
            path: Vec::new(),
            requires_initial_move: false,
            initial_move_distance: 0.0,
        }
    }

    /// Number of transitions along the path.
    pub fn number_of_steps(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    /// True if the device already sits at the target.
    pub fn is_at_target(&self) -> bool {
        self.is_valid && !self.requires_initial_move && self.number_of_steps() == 0
    }

    /// Convert an invalid analysis into the matching typed error.
    pub fn into_result(self) -> StationResult<Self> {
        if self.is_valid {
            return Ok(self);
        }
        let message = self
            .error
            .clone()
            .unwrap_or_else(|| "invalid path analysis".to_string());
        Err(match self.failure {
            Some(PathFailure::DeviceNotConfigured) => {
                StationError::DeviceNotConfigured(self.device.to_string())
            }
            Some(PathFailure::NotConnected) => StationError::NotConnected(self.device.to_string()),
            Some(PathFailure::PositionUnavailable) => StationError::motion(self.device, message),
            _ => StationError::Configuration(message),
        })
    }
}

/// Planner over the registry and per-device motion graphs.
pub struct PathPlanner {
    registry: PositionRegistry,
    graphs: BTreeMap<DeviceId, MotionGraph>,
    motion: Arc<dyn DeviceMovement>,
}

impl std::fmt::Debug for PathPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathPlanner")
            .field("devices", &self.graphs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PathPlanner {
    /// Planner from explicit tables.
    pub fn new(
        registry: PositionRegistry,
        graphs: BTreeMap<DeviceId, MotionGraph>,
        motion: Arc<dyn DeviceMovement>,
    ) -> Self {
        Self {
            registry,
            graphs,
            motion,
        }
    }

    /// Build registry and graphs from configuration.
    ///
    /// Every named position becomes a node, even without edges, so a device
    /// resting at its target always has the trivial path.
    pub fn from_config(
        config: &StationConfig,
        motion: Arc<dyn DeviceMovement>,
    ) -> StationResult<Self> {
        let registry = PositionRegistry::from_config(config);
        let mut graphs = BTreeMap::new();
        for (device, device_config) in &config.devices {
            let mut graph = MotionGraph::new();
            for named in &device_config.positions {
                graph.add_node(&named.name);
            }
            for edge in &device_config.edges {
                graph.add_edge(&edge.from, &edge.to, edge.weight)?;
            }
            debug!(
                device = %device,
                nodes = graph.node_count(),
                edges = graph.edge_count(),
                "Motion graph loaded"
            );
            graphs.insert(*device, graph);
        }
        Ok(Self::new(registry, graphs, motion))
    }

    /// Named positions.
    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    /// Motion graph of a device.
    pub fn graph(&self, device: DeviceId) -> Option<&MotionGraph> {
        self.graphs.get(&device)
    }

    /// Motion collaborator used for position reads.
    pub fn motion(&self) -> &Arc<dyn DeviceMovement> {
        &self.motion
    }

    /// Read the device pose and match it against its named positions.
    pub async fn resolve_current_position(&self, device: DeviceId) -> StationResult<Resolution> {
        if !self.registry.contains_device(device) {
            return Err(StationError::DeviceNotConfigured(device.to_string()));
        }
        let current = self
            .motion
            .current_position(device)
            .await
            .map_err(|e| StationError::motion(device, format!("{:#}", e)))?;
        Ok(self.registry.resolve(device, &current))
    }

    /// Plan a move of `device` to the named position `target`.
    #[instrument(skip_all, fields(device = %device, target_position = target))]
    pub async fn analyze_movement_path(&self, device: DeviceId, target: &str) -> PathAnalysis {
        let analysis = self.analyze(device, target).await;
        match &analysis.error {
            Some(error) => warn!(%error, "Path analysis failed"),
            None => debug!(
                path = ?analysis.path,
                requires_initial_move = analysis.requires_initial_move,
                "Path analysis complete"
            ),
        }
        analysis
    }

    async fn analyze(&self, device: DeviceId, target: &str) -> PathAnalysis {
        let invalid = |failure, error: String| PathAnalysis::invalid(device, target, failure, error);

        if !self.registry.contains_device(device) {
            return invalid(
                PathFailure::DeviceNotConfigured,
                format!("Device '{}' is not configured", device),
            );
        }
        let Some(graph) = self.graphs.get(&device) else {
            return invalid(
                PathFailure::NoGraph,
                format!("No motion graph for device '{}'", device),
            );
        };
        if self.registry.positions(device).is_empty() {
            return invalid(
                PathFailure::NoNamedPositions,
                format!("Device '{}' has no named positions", device),
            );
        }
        if self.registry.get(device, target).is_none() {
            return invalid(
                PathFailure::UnknownTarget,
                format!("Unknown position '{}' for device '{}'", target, device),
            );
        }
        if !self.motion.is_connected(device).await {
            return invalid(
                PathFailure::NotConnected,
                format!("Device '{}' is not connected", device),
            );
        }
        let current = match self.motion.current_position(device).await {
            Ok(current) => current,
            Err(e) => {
                return invalid(
                    PathFailure::PositionUnavailable,
                    format!("Failed to read position of '{}': {:#}", device, e),
                )
            }
        };

        let (start, requires_initial_move, initial_move_distance) =
            match self.registry.resolve(device, &current) {
                Resolution::Known { name, .. } => (name, false, 0.0),
                Resolution::Unknown {
                    nearest: Some((name, distance)),
                } => (name, true, distance),
                Resolution::Unknown { nearest: None } => {
                    return invalid(
                        PathFailure::NoNamedPositions,
                        format!("Device '{}' has no named positions", device),
                    )
                }
            };

        let Some(path) = graph.shortest_path(&start, target) else {
            return invalid(
                PathFailure::Unreachable,
                format!("No path from '{}' to '{}' for device '{}'", start, target, device),
            );
        };

        PathAnalysis {
            device,
            is_valid: true,
            error: None,
            failure: None,
            current_position_name: Some(start),
            target_position_name: target.to_string(),
            path,
            requires_initial_move,
            initial_move_distance,
        }
    }
}
