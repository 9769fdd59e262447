//! Fully simulated station built from configuration.

use super::{CouplingModel, SimulatedCamera, SimulatedIo, SimulatedMeasurement, SimulatedMotion};
use crate::config::StationConfig;
use crate::io::IoPinMap;
use station_core::{DeviceId, Position, StationError, StationResult};
use std::sync::Arc;
use tracing::info;

/// All simulators wired together for one station configuration.
#[derive(Debug, Clone)]
pub struct SimulatedStation {
    /// Positioning devices
    pub motion: Arc<SimulatedMotion>,
    /// I/O board with slide physics
    pub io: Arc<SimulatedIo>,
    /// Optical coupling channel
    pub measurement: Arc<SimulatedMeasurement>,
    /// Camera
    pub camera: Arc<SimulatedCamera>,
    /// Logical pin map
    pub pins: IoPinMap,
}

impl SimulatedStation {
    /// Build simulators for every configured device, pin and slide.
    ///
    /// Each device starts at its first named position. Slides start retracted.
    pub fn from_config(config: &StationConfig) -> StationResult<Self> {
        let sim = &config.simulation;
        let motion = SimulatedMotion::new(sim.move_latency);
        for (device, device_config) in &config.devices {
            let start = device_config
                .positions
                .first()
                .map(|p| p.position)
                .unwrap_or(Position::ORIGIN);
            motion.add_device(*device, start);
        }

        let pins = IoPinMap::from_config(&config.io);
        let io = SimulatedIo::new();
        for (name, slide) in &config.slides {
            let valve = pins.output(&slide.output)?;
            let up = pins.input(&slide.up_sensor)?;
            let down = pins.input(&slide.down_sensor)?;
            io.attach_slide(
                (&valve.device, &valve.pin),
                (&up.device, &up.pin),
                (&down.device, &down.pin),
                slide.active_high,
                sim.slide_travel,
            );
            info!(slide = %name, "Simulated slide attached");
        }

        let measurement = SimulatedMeasurement::new(Arc::clone(&motion));
        if config.devices.contains_key(&sim.coupling_device) {
            measurement.add_channel(&config.scanning.channel, CouplingModel::from_config(sim));
        }

        let camera = SimulatedCamera::new(config.storage.root.join("images"));

        info!(
            devices = config.devices.len(),
            pins = pins.len(),
            slides = config.slides.len(),
            "Simulated station ready"
        );

        Ok(Self {
            motion,
            io,
            measurement,
            camera,
            pins,
        })
    }

    /// Current simulated pose of a device.
    pub fn pose(&self, device: DeviceId) -> StationResult<Position> {
        self.motion
            .pose(device)
            .ok_or_else(|| StationError::DeviceNotConfigured(device.to_string()))
    }
}
