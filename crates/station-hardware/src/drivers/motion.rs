//! Simulated positioning devices.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use station_core::{Axis, DeviceId, DeviceMovement, Position};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Kind of a recorded move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveKind {
    /// Absolute pose
    Absolute,
    /// Single-axis offset
    Relative(Axis, f64),
}

/// One completed simulated move.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    /// Device that moved
    pub device: DeviceId,
    /// How the move was requested
    pub kind: MoveKind,
    /// Pose after the move
    pub target: Position,
    /// When motion started
    pub started: Instant,
    /// When motion settled
    pub finished: Instant,
}

impl MoveRecord {
    /// True if the two moves were in motion at the same time.
    pub fn overlaps(&self, other: &MoveRecord) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

#[derive(Debug)]
struct DeviceState {
    pose: Position,
    connected: bool,
    fail_next: Option<String>,
}

/// Simulated hexapods and gantry with a fixed move latency.
///
/// Every completed move is appended to a log so tests can check ordering and
/// overlap.
///
/// # Example
///
/// ```rust,ignore
/// let motion = SimulatedMotion::new(Duration::from_millis(5));
/// motion.add_device(DeviceId::Gantry, Position::ORIGIN);
/// motion.move_to_absolute(DeviceId::Gantry, Position::translation(1.0, 0.0, 0.0)).await?;
/// assert_eq!(motion.moves().len(), 1);
/// ```
#[derive(Debug)]
pub struct SimulatedMotion {
    devices: Mutex<HashMap<DeviceId, DeviceState>>,
    move_latency: Duration,
    log: Mutex<Vec<MoveRecord>>,
}

impl SimulatedMotion {
    /// No devices yet; each move takes `move_latency`.
    pub fn new(move_latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(HashMap::new()),
            move_latency,
            log: Mutex::new(Vec::new()),
        })
    }

    /// Add a connected device at `initial`.
    pub fn add_device(&self, device: DeviceId, initial: Position) {
        self.devices.lock().insert(
            device,
            DeviceState {
                pose: initial,
                connected: true,
                fail_next: None,
            },
        );
    }

    /// Current pose without going through the async trait.
    pub fn pose(&self, device: DeviceId) -> Option<Position> {
        self.devices.lock().get(&device).map(|s| s.pose)
    }

    /// Teleport a device (no log entry).
    pub fn set_pose(&self, device: DeviceId, pose: Position) {
        if let Some(state) = self.devices.lock().get_mut(&device) {
            state.pose = pose;
        }
    }

    /// Mark a device connected or disconnected.
    pub fn set_connected(&self, device: DeviceId, connected: bool) {
        if let Some(state) = self.devices.lock().get_mut(&device) {
            state.connected = connected;
        }
    }

    /// Make the next move of `device` fail with `message`.
    pub fn fail_next_move(&self, device: DeviceId, message: impl Into<String>) {
        if let Some(state) = self.devices.lock().get_mut(&device) {
            state.fail_next = Some(message.into());
        }
    }

    /// All completed moves in completion order.
    pub fn moves(&self) -> Vec<MoveRecord> {
        self.log.lock().clone()
    }

    /// Completed moves of one device.
    pub fn moves_of(&self, device: DeviceId) -> Vec<MoveRecord> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.device == device)
            .cloned()
            .collect()
    }

    /// Forget the move log.
    pub fn clear_moves(&self) {
        self.log.lock().clear();
    }

    fn check_ready(&self, device: DeviceId) -> Result<()> {
        let mut devices = self.devices.lock();
        let state = devices
            .get_mut(&device)
            .ok_or_else(|| anyhow!("unknown device {}", device))?;
        if !state.connected {
            bail!("controller for {} is not connected", device);
        }
        if let Some(message) = state.fail_next.take() {
            bail!(message);
        }
        Ok(())
    }

    async fn perform(&self, device: DeviceId, kind: MoveKind, target: Position) -> Result<()> {
        self.check_ready(device)?;
        let started = Instant::now();
        sleep(self.move_latency).await;

        {
            let mut devices = self.devices.lock();
            let state = devices
                .get_mut(&device)
                .ok_or_else(|| anyhow!("unknown device {}", device))?;
            state.pose = target;
        }
        self.log.lock().push(MoveRecord {
            device,
            kind,
            target,
            started,
            finished: Instant::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl DeviceMovement for SimulatedMotion {
    async fn move_to_absolute(&self, device: DeviceId, target: Position) -> Result<()> {
        if !target.is_finite() {
            bail!("target {} is not finite", target);
        }
        if !device.uses_rotary_axes() && (target.u != 0.0 || target.v != 0.0 || target.w != 0.0)
        {
            bail!("{} has no rotary axes", device);
        }
        self.perform(device, MoveKind::Absolute, target).await
    }

    async fn move_relative(&self, device: DeviceId, axis: Axis, delta: f64) -> Result<()> {
        if !device.supports_axis(axis) {
            bail!("{} has no {} axis", device, axis);
        }
        let current = self
            .pose(device)
            .ok_or_else(|| anyhow!("unknown device {}", device))?;
        self.perform(device, MoveKind::Relative(axis, delta), current.offset(axis, delta))
            .await
    }

    async fn current_position(&self, device: DeviceId) -> Result<Position> {
        let devices = self.devices.lock();
        let state = devices
            .get(&device)
            .ok_or_else(|| anyhow!("unknown device {}", device))?;
        if !state.connected {
            bail!("controller for {} is not connected", device);
        }
        Ok(state.pose)
    }

    async fn is_connected(&self, device: DeviceId) -> bool {
        self.devices
            .lock()
            .get(&device)
            .is_some_and(|s| s.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_core::HexapodLocation;

    #[tokio::test]
    async fn test_moves_update_pose_and_log() {
        let motion = SimulatedMotion::new(Duration::from_millis(1));
        let hex = DeviceId::Hexapod(HexapodLocation::Right);
        motion.add_device(hex, Position::ORIGIN);

        motion
            .move_to_absolute(hex, Position::new(1.0, 2.0, 3.0, 0.1, 0.0, 0.0))
            .await
            .unwrap();
        motion.move_relative(hex, Axis::Z, -0.5).await.unwrap();

        let pose = motion.current_position(hex).await.unwrap();
        assert_eq!(pose.z, 2.5);
        assert_eq!(pose.u, 0.1);
        let log = motion.moves();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].kind, MoveKind::Relative(Axis::Z, -0.5));
    }

    #[tokio::test]
    async fn test_gantry_rejects_rotation() {
        let motion = SimulatedMotion::new(Duration::ZERO);
        motion.add_device(DeviceId::Gantry, Position::ORIGIN);
        assert!(motion.move_relative(DeviceId::Gantry, Axis::U, 1.0).await.is_err());
        assert!(motion
            .move_to_absolute(DeviceId::Gantry, Position::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disconnected_and_injected_failures() {
        let motion = SimulatedMotion::new(Duration::ZERO);
        motion.add_device(DeviceId::Gantry, Position::ORIGIN);

        motion.fail_next_move(DeviceId::Gantry, "limit switch");
        let err = motion
            .move_relative(DeviceId::Gantry, Axis::X, 1.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit switch"));
        assert!(motion.move_relative(DeviceId::Gantry, Axis::X, 1.0).await.is_ok());

        motion.set_connected(DeviceId::Gantry, false);
        assert!(!motion.is_connected(DeviceId::Gantry).await);
        assert!(motion.current_position(DeviceId::Gantry).await.is_err());
    }
}
