//! The simulated station wired together for the command line.

use anyhow::{Context, Result};
use station_core::{
    CancelToken, CommandHandle, CommandResult, CommandSequence, DelayCommand, DeviceId,
    HexapodLocation,
};
use station_hardware::drivers::SimulatedStation;
use station_hardware::{SlideTarget, StationConfig};
use station_motion::{
    CoordinatedCommand, CoordinatedExecutor, CoordinatedSequenceCommand,
    MoveToNamedPositionCommand, PathAnalysis,
};
use station_scan::{JsonFileStorage, PeakSearch, ScanCommand, ScanOutcome, ScanningParameters};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Hexapod aligned by the demo cycle.
pub const DEMO_ALIGN_DEVICE: DeviceId = DeviceId::Hexapod(HexapodLocation::Left);

/// Configuration, simulators and executor for one run.
#[derive(Debug)]
pub struct StationApp {
    config: StationConfig,
    station: SimulatedStation,
    executor: Arc<CoordinatedExecutor>,
}

impl StationApp {
    /// Build the simulated station described by `config`.
    pub async fn from_config(config: StationConfig) -> Result<Self> {
        let station =
            SimulatedStation::from_config(&config).context("building simulated station")?;
        let executor =
            CoordinatedExecutor::from_config(&config, station.motion.clone(), station.io.clone())
                .await
                .context("building coordinated executor")?
                .with_camera(station.camera.clone());

        info!(station = %config.station.name, "Station ready");
        Ok(Self {
            config,
            station,
            executor: Arc::new(executor),
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Simulators behind the capability traits.
    pub fn station(&self) -> &SimulatedStation {
        &self.station
    }

    /// Shared executor.
    pub fn executor(&self) -> &Arc<CoordinatedExecutor> {
        &self.executor
    }

    /// Plan a move without moving.
    pub async fn plan(&self, device: DeviceId, target: &str) -> PathAnalysis {
        self.executor
            .planner()
            .analyze_movement_path(device, target)
            .await
    }

    /// Move `device` to the named position `target`.
    pub async fn move_to(&self, device: DeviceId, target: &str, token: &CancelToken) -> CommandResult {
        let handle = CommandHandle::new(MoveToNamedPositionCommand::new(
            Arc::clone(&self.executor),
            device,
            target,
        ));
        handle.execute(token).await
    }

    /// Peak search on `device` from its current pose.
    ///
    /// Records go under `output`, or the configured storage root.
    pub async fn scan(
        &self,
        device: DeviceId,
        output: Option<&Path>,
        token: &CancelToken,
    ) -> Result<(CommandResult, Option<ScanOutcome>)> {
        let command = Arc::new(self.scan_command(device, output)?);
        let handle = CommandHandle::from_arc(command.clone());
        let result = handle.execute(token).await;
        Ok((result, command.outcome()))
    }

    fn scan_command(&self, device: DeviceId, output: Option<&Path>) -> Result<ScanCommand> {
        let params = ScanningParameters::try_from(self.config.scanning.clone())
            .context("invalid [scanning] parameters")?;
        let root: PathBuf = output.map_or_else(|| self.config.storage.root.clone(), Path::to_path_buf);
        let search = PeakSearch::new(
            device,
            params,
            self.station.motion.clone(),
            self.station.measurement.clone(),
            Arc::new(JsonFileStorage::new(root)),
        );
        Ok(ScanCommand::new(Arc::new(search)))
    }

    /// Full bonding cycle: stage both hexapods and the gantry, align, dispense, cure.
    pub fn demo_sequence(&self) -> Result<CommandSequence> {
        let left = DEMO_ALIGN_DEVICE;
        let right = DeviceId::Hexapod(HexapodLocation::Right);
        let executor = &self.executor;

        let stage = CoordinatedSequenceCommand::new(
            "Stage",
            Arc::clone(executor),
            vec![
                CoordinatedCommand::motion(left, "Approach", 0),
                CoordinatedCommand::motion(right, "Clear", 0),
                CoordinatedCommand::motion(DeviceId::Gantry, "Dispense", 0),
            ],
        );
        let dispense = CoordinatedSequenceCommand::new(
            "Dispense and cure",
            Arc::clone(executor),
            vec![
                CoordinatedCommand::slide("dispenser", SlideTarget::Down, 0).blocking(),
                CoordinatedCommand::timer(Duration::from_millis(200), 1),
                CoordinatedCommand::slide("dispenser", SlideTarget::Up, 2),
                CoordinatedCommand::output("uv_lamp", true, 3),
                CoordinatedCommand::image_capture("top", "bond", 3),
                CoordinatedCommand::timer(Duration::from_millis(100), 4),
                CoordinatedCommand::output("uv_lamp", false, 5),
                CoordinatedCommand::motion(DeviceId::Gantry, "Inspect", 5),
            ],
        );

        Ok(CommandSequence::new("Bonding cycle")
            .with_description("Stage, align, dispense and cure one part")
            .then(stage)
            .then(MoveToNamedPositionCommand::new(Arc::clone(executor), left, "Align"))
            .then(self.scan_command(left, None)?)
            .then(DelayCommand::new("Settle", Duration::from_millis(50)))
            .then(dispense))
    }

    /// Run [`Self::demo_sequence`].
    pub async fn demo(&self, token: &CancelToken) -> Result<CommandResult> {
        let handle = CommandHandle::new(self.demo_sequence()?);
        Ok(handle.execute(token).await)
    }
}
