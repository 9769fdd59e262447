//! Pneumatic slide state machine.
//!
//! A slide is one output valve and two end-of-travel sensors. Its state is
//! recomputed from the sensors on every I/O notification:
//!
//! | up | down | state   |
//! |----|------|---------|
//! | 1  | 0    | Up      |
//! | 0  | 1    | Down    |
//! | *  | *    | Unknown |
//!
//! Only one request per slide is in flight; a new request cancels the
//! previous one, which then reports cancellation. A request matching the
//! sensed state returns without I/O only while no other request is in flight.

use crate::config::SlideConfig;
use crate::io::{write_output, IoPinMap, PinAddress};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use station_core::limits::SLIDE_POLL_INTERVAL;
use station_core::{CancelToken, DigitalIo, PinDirection, StationError, StationResult};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Position of a slide as reported by its sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideState {
    /// Retracted
    Up,
    /// Extended
    Down,
    /// Travelling, or sensors disagree
    Unknown,
}

impl SlideState {
    /// State implied by the two sensor levels.
    pub fn from_sensors(up: Option<bool>, down: Option<bool>) -> Self {
        match (up, down) {
            (Some(true), Some(false)) => SlideState::Up,
            (Some(false), Some(true)) => SlideState::Down,
            _ => SlideState::Unknown,
        }
    }
}

/// End position a slide can be driven to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideTarget {
    /// Retract
    Up,
    /// Extend
    Down,
}

impl From<SlideTarget> for SlideState {
    fn from(target: SlideTarget) -> Self {
        match target {
            SlideTarget::Up => SlideState::Up,
            SlideTarget::Down => SlideState::Down,
        }
    }
}

/// Result of a slide request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideOutcome {
    /// State confirmed by the sensors
    pub reached: SlideState,
    /// Time from request to confirmation
    pub duration: Duration,
    /// False when the slide was already in place and no output was written
    pub io_issued: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Sensors {
    up: Option<bool>,
    down: Option<bool>,
}

/// A pneumatic slide bound to its I/O pins.
pub struct PneumaticSlide {
    name: String,
    output: PinAddress,
    up_sensor: PinAddress,
    down_sensor: PinAddress,
    active_high: bool,
    timeout: Duration,
    io: Arc<dyn DigitalIo>,
    sensors: Mutex<Sensors>,
    state_tx: watch::Sender<SlideState>,
    inflight: Mutex<Option<CancelToken>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PneumaticSlide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PneumaticSlide")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl PneumaticSlide {
    /// Bind a configured slide to its pins and start following its sensors.
    pub async fn new(
        name: impl Into<String>,
        config: &SlideConfig,
        pins: &IoPinMap,
        io: Arc<dyn DigitalIo>,
    ) -> StationResult<Arc<Self>> {
        let name = name.into();
        let (state_tx, _) = watch::channel(SlideState::Unknown);
        let slide = Arc::new(Self {
            output: pins.output(&config.output)?.clone(),
            up_sensor: pins.input(&config.up_sensor)?.clone(),
            down_sensor: pins.input(&config.down_sensor)?.clone(),
            active_high: config.active_high,
            timeout: config.timeout,
            io,
            sensors: Mutex::new(Sensors::default()),
            state_tx,
            inflight: Mutex::new(None),
            listener: Mutex::new(None),
            name,
        });

        // Subscribe before the initial read so no change falls in between.
        let rx = slide.io.subscribe();
        slide.refresh().await?;
        let handle = tokio::spawn(listen(Arc::downgrade(&slide), rx));
        *slide.listener.lock() = Some(handle);

        debug!(slide = %slide.name, state = ?slide.state(), "Slide ready");
        Ok(slide)
    }

    /// Slide name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> SlideState {
        *self.state_tx.borrow()
    }

    /// Watch the state.
    pub fn subscribe_state(&self) -> watch::Receiver<SlideState> {
        self.state_tx.subscribe()
    }

    /// Extend the slide (Down).
    pub async fn activate(&self, token: &CancelToken) -> StationResult<SlideOutcome> {
        self.move_to(SlideTarget::Down, token).await
    }

    /// Retract the slide (Up).
    pub async fn deactivate(&self, token: &CancelToken) -> StationResult<SlideOutcome> {
        self.move_to(SlideTarget::Up, token).await
    }

    /// Drive the slide to `target` and wait for sensor confirmation.
    #[instrument(skip(self, token), fields(slide = %self.name))]
    pub async fn move_to(
        &self,
        target: SlideTarget,
        token: &CancelToken,
    ) -> StationResult<SlideOutcome> {
        let target = SlideState::from(target);
        let request = token.child_token();
        {
            let mut inflight = self.inflight.lock();
            match inflight.take() {
                Some(previous) => {
                    debug!("Superseding in-flight slide request");
                    previous.cancel();
                }
                // With a request in flight the valve may already be driving
                // away from the sensed state, so only an idle slide can skip I/O.
                None if self.state() == target => {
                    debug!(?target, "Slide already in place");
                    return Ok(SlideOutcome {
                        reached: target,
                        duration: Duration::ZERO,
                        io_issued: false,
                    });
                }
                None => {}
            }
            *inflight = Some(request.clone());
        }

        let start = Instant::now();
        let result = self.drive_and_confirm(target, &request, start).await;

        {
            let mut inflight = self.inflight.lock();
            if inflight.as_ref().is_some_and(|t| t.same_token(&request)) {
                *inflight = None;
            }
        }

        match &result {
            Ok(outcome) => info!(
                ?target,
                duration_ms = outcome.duration.as_millis() as u64,
                "Slide confirmed"
            ),
            Err(e) => warn!(?target, error = %e, "Slide request did not complete"),
        }
        result
    }

    async fn drive_and_confirm(
        &self,
        target: SlideState,
        request: &CancelToken,
        start: Instant,
    ) -> StationResult<SlideOutcome> {
        let level = (target == SlideState::Down) == self.active_high;
        write_output(self.io.as_ref(), &self.output, level).await?;

        let deadline = tokio::time::Instant::from_std(start + self.timeout);
        let mut rx = self.state_tx.subscribe();
        loop {
            if *rx.borrow_and_update() == target {
                return Ok(SlideOutcome {
                    reached: target,
                    duration: start.elapsed(),
                    io_issued: true,
                });
            }
            if request.is_cancelled() {
                return Err(StationError::Cancelled(format!(
                    "Slide '{}' request superseded or cancelled",
                    self.name
                )));
            }
            tokio::select! {
                _ = rx.changed() => {}
                _ = tokio::time::sleep(SLIDE_POLL_INTERVAL) => {
                    self.refresh().await?;
                }
                _ = request.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(StationError::timeout(
                        format!("Slide '{}' to {:?}", self.name, target),
                        start.elapsed(),
                        self.timeout,
                    ));
                }
            }
        }
    }

    /// Re-read both sensors from the board.
    async fn refresh(&self) -> StationResult<()> {
        let up = self.read_sensor(&self.up_sensor).await?;
        let down = self.read_sensor(&self.down_sensor).await?;
        {
            let mut sensors = self.sensors.lock();
            sensors.up = up;
            sensors.down = down;
        }
        self.recompute();
        Ok(())
    }

    async fn read_sensor(&self, address: &PinAddress) -> StationResult<Option<bool>> {
        self.io
            .pin_state(&address.device, &address.pin, PinDirection::Input)
            .await
            .map_err(|e| StationError::io(&address.device, &address.pin, format!("{:#}", e)))
    }

    fn on_change(&self, device: &str, pin: &str, state: bool) {
        let relevant = {
            let mut sensors = self.sensors.lock();
            if device == self.up_sensor.device && pin == self.up_sensor.pin {
                sensors.up = Some(state);
                true
            } else if device == self.down_sensor.device && pin == self.down_sensor.pin {
                sensors.down = Some(state);
                true
            } else {
                false
            }
        };
        if relevant {
            self.recompute();
        }
    }

    fn recompute(&self) {
        let sensors = *self.sensors.lock();
        let state = SlideState::from_sensors(sensors.up, sensors.down);
        self.state_tx.send_if_modified(|current| {
            if *current != state {
                debug!(slide = %self.name, from = ?*current, to = ?state, "Slide state changed");
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for PneumaticSlide {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

async fn listen(
    slide: Weak<PneumaticSlide>,
    mut rx: tokio::sync::broadcast::Receiver<station_core::PinStateChange>,
) {
    loop {
        match rx.recv().await {
            Ok(change) => {
                let Some(slide) = slide.upgrade() else { break };
                slide.on_change(&change.device, &change.pin, change.state);
            }
            Err(RecvError::Lagged(skipped)) => {
                let Some(slide) = slide.upgrade() else { break };
                warn!(slide = %slide.name, skipped, "Slide listener lagged, re-reading sensors");
                if let Err(e) = slide.refresh().await {
                    warn!(slide = %slide.name, error = %e, "Sensor refresh failed");
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SimulatedIo;
    use tracing_test::traced_test;

    const VALVE: (&str, &str) = ("io-main", "DO1");
    const UP: (&str, &str) = ("io-main", "DI1");
    const DOWN: (&str, &str) = ("io-main", "DI2");

    fn pins() -> IoPinMap {
        let mut map = IoPinMap::new();
        map.insert("valve", VALVE.0, VALVE.1, PinDirection::Output);
        map.insert("up", UP.0, UP.1, PinDirection::Input);
        map.insert("down", DOWN.0, DOWN.1, PinDirection::Input);
        map
    }

    fn config(timeout: Duration) -> SlideConfig {
        SlideConfig {
            output: "valve".into(),
            up_sensor: "up".into(),
            down_sensor: "down".into(),
            active_high: true,
            timeout,
        }
    }

    async fn slide_with_physics(travel: Duration) -> (Arc<SimulatedIo>, Arc<PneumaticSlide>) {
        let io = SimulatedIo::new();
        io.attach_slide(VALVE, UP, DOWN, true, travel);
        let slide = PneumaticSlide::new("dispenser", &config(Duration::from_secs(2)), &pins(), io.clone())
            .await
            .unwrap();
        (io, slide)
    }

    #[test]
    fn test_state_from_sensors() {
        assert_eq!(SlideState::from_sensors(Some(true), Some(false)), SlideState::Up);
        assert_eq!(SlideState::from_sensors(Some(false), Some(true)), SlideState::Down);
        assert_eq!(SlideState::from_sensors(Some(true), Some(true)), SlideState::Unknown);
        assert_eq!(SlideState::from_sensors(None, Some(false)), SlideState::Unknown);
    }

    #[test]
    fn test_targets_are_end_states() {
        assert_eq!(SlideState::from(SlideTarget::Up), SlideState::Up);
        assert_eq!(SlideState::from(SlideTarget::Down), SlideState::Down);
    }

    #[tokio::test]
    async fn test_move_to_target_confirms_end_state() {
        let (_io, slide) = slide_with_physics(Duration::from_millis(20)).await;
        let outcome = slide
            .move_to(SlideTarget::Down, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.reached, SlideState::Down);
        assert!(outcome.io_issued);
        assert_eq!(slide.state(), SlideState::Down);
    }

    #[tokio::test]
    async fn test_activate_and_deactivate() {
        let (io, slide) = slide_with_physics(Duration::from_millis(40)).await;
        assert_eq!(slide.state(), SlideState::Up);

        let outcome = slide.activate(&CancelToken::new()).await.unwrap();
        assert_eq!(outcome.reached, SlideState::Down);
        assert!(outcome.io_issued);
        assert!(outcome.duration >= Duration::from_millis(40));
        assert_eq!(
            io.pin_state(VALVE.0, VALVE.1, PinDirection::Output).await.unwrap(),
            Some(true)
        );

        let outcome = slide.deactivate(&CancelToken::new()).await.unwrap();
        assert_eq!(outcome.reached, SlideState::Up);
        assert_eq!(slide.state(), SlideState::Up);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_already_in_place_issues_no_io() {
        let (io, slide) = slide_with_physics(Duration::from_millis(10)).await;
        let writes_before = io.output_write_count();

        let outcome = slide.deactivate(&CancelToken::new()).await.unwrap();
        assert_eq!(outcome.reached, SlideState::Up);
        assert_eq!(outcome.duration, Duration::ZERO);
        assert!(!outcome.io_issued);
        assert_eq!(io.output_write_count(), writes_before);
        assert!(logs_contain("Slide already in place"));
    }

    #[tokio::test]
    async fn test_timeout_when_sensors_never_confirm() {
        let io = SimulatedIo::new();
        io.set_input(UP.0, UP.1, true);
        io.set_input(DOWN.0, DOWN.1, false);
        let slide = PneumaticSlide::new("stuck", &config(Duration::from_millis(150)), &pins(), io.clone())
            .await
            .unwrap();

        let err = slide.activate(&CancelToken::new()).await.unwrap_err();
        match err {
            StationError::Timeout { limit, .. } => assert_eq!(limit, Duration::from_millis(150)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_latest_request_wins() {
        let (_io, slide) = slide_with_physics(Duration::from_millis(200)).await;

        let first = {
            let slide = Arc::clone(&slide);
            tokio::spawn(async move { slide.activate(&CancelToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = slide.deactivate(&CancelToken::new()).await.unwrap();

        let first = first.await.unwrap();
        assert!(matches!(first, Err(ref e) if e.is_cancelled()));
        assert_eq!(second.reached, SlideState::Up);
        assert_eq!(slide.state(), SlideState::Up);
    }

    #[tokio::test]
    async fn test_request_matching_sensors_still_supersedes_inflight() {
        // No physics: the sensors only move when the test flips them.
        let io = SimulatedIo::new();
        io.set_input(UP.0, UP.1, true);
        io.set_input(DOWN.0, DOWN.1, false);
        let slide = PneumaticSlide::new("dispenser", &config(Duration::from_secs(2)), &pins(), io.clone())
            .await
            .unwrap();

        let first = {
            let slide = Arc::clone(&slide);
            tokio::spawn(async move { slide.activate(&CancelToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            io.pin_state(VALVE.0, VALVE.1, PinDirection::Output).await.unwrap(),
            Some(true)
        );
        assert_eq!(slide.state(), SlideState::Up);

        let second = slide.deactivate(&CancelToken::new()).await.unwrap();
        assert_eq!(second.reached, SlideState::Up);
        assert!(second.io_issued);
        assert_eq!(
            io.pin_state(VALVE.0, VALVE.1, PinDirection::Output).await.unwrap(),
            Some(false)
        );

        let first = first.await.unwrap();
        assert!(matches!(first, Err(ref e) if e.is_cancelled()), "{first:?}");

        // Idle again: a matching request skips I/O.
        let writes = io.output_write_count();
        let third = slide.deactivate(&CancelToken::new()).await.unwrap();
        assert!(!third.io_issued);
        assert_eq!(io.output_write_count(), writes);
    }

    #[tokio::test]
    async fn test_state_follows_external_sensor_changes() {
        let (io, slide) = slide_with_physics(Duration::from_millis(10)).await;
        let mut states = slide.subscribe_state();

        io.set_input(UP.0, UP.1, false);
        io.set_input(DOWN.0, DOWN.1, true);
        tokio::time::timeout(Duration::from_secs(1), async {
            while *states.borrow_and_update() != SlideState::Down {
                states.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(slide.state(), SlideState::Down);
    }
}
