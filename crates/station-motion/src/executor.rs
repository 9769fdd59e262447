//! Coordinated multi-device executor.
//!
//! Commands are grouped by `execution_order` and groups run strictly one
//! after another. Inside a group every member is spawned in list order; a
//! blocking member is awaited before the next one starts, the rest are
//! awaited at the group barrier.
//!
//! # Resource groups
//!
//! Devices sharing a physical envelope hold one permit of a per-group
//! semaphore for the whole of their path walk, so at most one hexapod moves at
//! a time. Devices without a group (the gantry) never wait on a permit.
//!
//! # Failure
//!
//! The first failing member stops the run. Members of the failing group that
//! were already started are still awaited before the error is returned, and
//! completed moves are not rolled back.

use crate::coordinated::{group_by_order, CoordinatedAction, CoordinatedCommand};
use crate::planner::PathPlanner;
use parking_lot::Mutex;
use serde::Serialize;
use station_core::limits::INPUT_WAIT_TIMEOUT;
use station_core::{
    CancelToken, CommandContext, DeviceId, DeviceMovement, DigitalIo, ImageCapture, ResourceGroup,
    StationError, StationResult,
};
use station_hardware::io::{write_output, PinStateCache};
use station_hardware::{IoPinMap, PneumaticSlide, SlideTarget, StationConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn, Instrument};

/// What one coordinated command did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    /// Index in the submitted list
    pub index: usize,
    /// Human-readable command
    pub description: String,
    /// Absolute moves issued by this command
    pub moves: usize,
    /// Wall-clock time of this command
    pub elapsed: Duration,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    /// Commands that completed
    pub commands_executed: usize,
    /// Absolute moves issued across all devices
    pub moves_issued: usize,
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
    /// Per-command outcomes ordered by submission index
    pub outcomes: Vec<CommandOutcome>,
}

impl ExecutionReport {
    fn record(&mut self, outcome: CommandOutcome) {
        self.commands_executed += 1;
        self.moves_issued += outcome.moves;
        self.outcomes.push(outcome);
    }
}

type MemberHandle = JoinHandle<StationResult<CommandOutcome>>;

/// Runs lists of [`CoordinatedCommand`]s against the station collaborators.
pub struct CoordinatedExecutor {
    planner: Arc<PathPlanner>,
    io: Arc<dyn DigitalIo>,
    pins: IoPinMap,
    inputs: Arc<PinStateCache>,
    slides: HashMap<String, Arc<PneumaticSlide>>,
    camera: Option<Arc<dyn ImageCapture>>,
    permits: Mutex<HashMap<ResourceGroup, Arc<Semaphore>>>,
    input_wait_timeout: Duration,
}

impl std::fmt::Debug for CoordinatedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatedExecutor")
            .field("planner", &self.planner)
            .field("pins", &self.pins.len())
            .field("inputs", &self.inputs.len())
            .field("slides", &self.slides.keys().collect::<Vec<_>>())
            .field("camera", &self.camera.is_some())
            .finish()
    }
}

impl CoordinatedExecutor {
    /// Executor without slides or camera.
    ///
    /// Spawns the input-cache listener, so it must run inside a Tokio runtime.
    pub fn new(planner: Arc<PathPlanner>, io: Arc<dyn DigitalIo>, pins: IoPinMap) -> Self {
        let inputs = PinStateCache::follow(Arc::clone(&io), &pins);
        Self {
            planner,
            io,
            pins,
            inputs,
            slides: HashMap::new(),
            camera: None,
            permits: Mutex::new(HashMap::new()),
            input_wait_timeout: INPUT_WAIT_TIMEOUT,
        }
    }

    /// Build planner, pin map and slides from configuration.
    pub async fn from_config(
        config: &StationConfig,
        motion: Arc<dyn DeviceMovement>,
        io: Arc<dyn DigitalIo>,
    ) -> StationResult<Self> {
        let planner = Arc::new(PathPlanner::from_config(config, motion)?);
        let pins = IoPinMap::from_config(&config.io);
        let mut executor = Self::new(planner, Arc::clone(&io), pins)
            .with_input_wait_timeout(config.motion.input_wait_timeout);
        for (name, slide_config) in &config.slides {
            let slide =
                PneumaticSlide::new(name.clone(), slide_config, &executor.pins, Arc::clone(&io))
                    .await?;
            executor = executor.with_slide(slide);
        }
        Ok(executor)
    }

    /// Register a slide under its own name.
    pub fn with_slide(mut self, slide: Arc<PneumaticSlide>) -> Self {
        self.slides.insert(slide.name().to_string(), slide);
        self
    }

    /// Attach an image capture collaborator.
    pub fn with_camera(mut self, camera: Arc<dyn ImageCapture>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Default limit for input waits without their own timeout.
    pub fn with_input_wait_timeout(mut self, timeout: Duration) -> Self {
        self.input_wait_timeout = timeout;
        self
    }

    /// Planner used for motion commands.
    pub fn planner(&self) -> &Arc<PathPlanner> {
        &self.planner
    }

    /// Registered slide.
    pub fn slide(&self, name: &str) -> Option<&Arc<PneumaticSlide>> {
        self.slides.get(name)
    }

    /// Run `commands` with only a cancel token.
    pub async fn execute(
        self: &Arc<Self>,
        commands: &[CoordinatedCommand],
        token: &CancelToken,
    ) -> StationResult<ExecutionReport> {
        self.execute_in(commands, &CommandContext::detached(token.clone()))
            .await
    }

    /// Run `commands` inside a command's pause/cancel scope.
    #[instrument(skip_all, fields(commands = commands.len()))]
    pub async fn execute_in(
        self: &Arc<Self>,
        commands: &[CoordinatedCommand],
        ctx: &CommandContext,
    ) -> StationResult<ExecutionReport> {
        let start = Instant::now();
        let mut report = ExecutionReport::default();

        for (order, members) in group_by_order(commands) {
            ctx.checkpoint().await?;
            debug!(order, members = members.len(), "Starting command group");

            let mut pending: Vec<MemberHandle> = Vec::new();
            let mut failure: Option<StationError> = None;

            for index in members {
                let command = &commands[index];
                let handle = self.spawn_member(index, command.clone(), ctx.clone());
                if command.wait_for_completion {
                    match join_member(handle).await {
                        Ok(outcome) => report.record(outcome),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                } else {
                    pending.push(handle);
                }
            }

            for handle in pending {
                match join_member(handle).await {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
            }

            if let Some(e) = failure {
                error!(
                    order,
                    completed = report.commands_executed,
                    error = %e,
                    "Coordinated run stopped"
                );
                return Err(e);
            }
        }

        report.outcomes.sort_by_key(|o| o.index);
        report.elapsed = start.elapsed();
        info!(
            commands = report.commands_executed,
            moves = report.moves_issued,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Coordinated run complete"
        );
        Ok(report)
    }

    fn spawn_member(
        self: &Arc<Self>,
        index: usize,
        command: CoordinatedCommand,
        ctx: CommandContext,
    ) -> MemberHandle {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            debug!(command = %command, "Coordinated command started");
            let moves = match this.dispatch(&command.action, &ctx).await {
                Ok(moves) => moves,
                Err(e) => {
                    warn!(command = %command, error = %e, "Coordinated command failed");
                    return Err(e);
                }
            };
            Ok(CommandOutcome {
                index,
                description: command.to_string(),
                moves,
                elapsed: started.elapsed(),
            })
        }
        .in_current_span())
    }

    async fn dispatch(&self, action: &CoordinatedAction, ctx: &CommandContext) -> StationResult<usize> {
        match action {
            CoordinatedAction::Motion { device, target } => {
                self.run_motion(*device, target, ctx).await
            }
            CoordinatedAction::Output { pin, state } => {
                ctx.checkpoint().await?;
                let address = self.pins.output(pin)?;
                write_output(self.io.as_ref(), address, *state).await?;
                Ok(0)
            }
            CoordinatedAction::SlideMove { slide, target } => {
                ctx.checkpoint().await?;
                self.run_slide(slide, *target, ctx.token()).await?;
                Ok(0)
            }
            CoordinatedAction::Timer { duration } => {
                ctx.sleep(*duration).await?;
                Ok(0)
            }
            CoordinatedAction::WaitForInput {
                pin,
                expected,
                timeout,
            } => {
                ctx.checkpoint().await?;
                let address = self.pins.input(pin)?;
                let limit = timeout.unwrap_or(self.input_wait_timeout);
                self.inputs
                    .wait_for(pin, address, *expected, limit, ctx.token())
                    .await?;
                Ok(0)
            }
            CoordinatedAction::ImageCapture { camera, label } => {
                ctx.checkpoint().await?;
                self.run_capture(camera, label).await?;
                Ok(0)
            }
        }
    }

    /// Walk the planned path of `device` to `target`, returning the moves issued.
    async fn run_motion(
        &self,
        device: DeviceId,
        target: &str,
        ctx: &CommandContext,
    ) -> StationResult<usize> {
        let motion = self.planner.motion();
        if !motion.is_connected(device).await {
            return Err(StationError::NotConnected(device.to_string()));
        }

        // The permit covers planning as well as the walk.
        let _permit = self.acquire_group(device, ctx.token()).await?;
        let analysis = self
            .planner
            .analyze_movement_path(device, target)
            .await
            .into_result()?;
        if analysis.is_at_target() {
            info!(device = %device, target, "Already at target position");
            return Ok(0);
        }

        let mut moves = 0;

        if analysis.requires_initial_move {
            if let Some(nearest) = &analysis.current_position_name {
                info!(
                    device = %device,
                    nearest = %nearest,
                    distance = analysis.initial_move_distance,
                    "Moving to nearest named position first"
                );
                ctx.checkpoint().await?;
                self.move_to_named(device, nearest).await?;
                moves += 1;
            }
        }

        for name in analysis.path.iter().skip(1) {
            ctx.checkpoint().await?;
            self.move_to_named(device, name).await?;
            moves += 1;
        }

        info!(device = %device, target, moves, "Device reached target position");
        Ok(moves)
    }

    async fn move_to_named(&self, device: DeviceId, name: &str) -> StationResult<()> {
        let position = self
            .planner
            .registry()
            .get(device, name)
            .ok_or_else(|| {
                StationError::Configuration(format!(
                    "Unknown position '{}' for device '{}'",
                    name, device
                ))
            })?;
        debug!(device = %device, position_name = name, "Issuing absolute move");
        self.planner
            .motion()
            .move_to_absolute(device, position)
            .await
            .map_err(|e| StationError::motion(device, format!("{:#}", e)))
    }

    async fn acquire_group(
        &self,
        device: DeviceId,
        token: &CancelToken,
    ) -> StationResult<Option<OwnedSemaphorePermit>> {
        let Some(group) = device.resource_group() else {
            return Ok(None);
        };
        let semaphore = Arc::clone(
            self.permits
                .lock()
                .entry(group)
                .or_insert_with(|| Arc::new(Semaphore::new(1))),
        );
        tokio::select! {
            permit = semaphore.acquire_owned() => permit
                .map(Some)
                .map_err(|_| StationError::Internal(format!("{:?} permit closed", group))),
            _ = token.cancelled() => Err(StationError::Cancelled(format!(
                "waiting for {:?} permit",
                group
            ))),
        }
    }

    async fn run_slide(
        &self,
        name: &str,
        target: SlideTarget,
        token: &CancelToken,
    ) -> StationResult<()> {
        let slide = self
            .slides
            .get(name)
            .ok_or_else(|| StationError::Configuration(format!("Unknown slide '{}'", name)))?;
        slide.move_to(target, token).await.map(|_| ())
    }

    async fn run_capture(&self, camera: &str, label: &str) -> StationResult<()> {
        let capture = self.camera.as_ref().ok_or_else(|| {
            StationError::Configuration("No image capture device configured".to_string())
        })?;
        let path = capture
            .capture(camera, label)
            .await
            .map_err(|e| StationError::Imaging {
                camera: camera.to_string(),
                message: format!("{:#}", e),
            })?;
        info!(camera, label, path = %path.display(), "Image captured");
        Ok(())
    }
}

async fn join_member(handle: MemberHandle) -> StationResult<CommandOutcome> {
    handle
        .await
        .map_err(|e| StationError::Internal(format!("Coordinated command task failed: {}", e)))?
}
