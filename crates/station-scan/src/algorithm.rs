//! Hill-climbing peak search.
//!
//! A session maximizes one measurement channel by moving one device along
//! its own axes, bypassing the path planner:
//!
//! 1. The starting pose and value become the baseline and the global peak.
//! 2. For every step size (coarse to fine) and every axis, [`Session::scan_axis`]
//!    probes both directions and keeps the better one.
//! 3. After each axis the current value is compared with the global peak. A
//!    shortfall `(peak - current) / current` above `improvement_threshold`
//!    sends the device back to the peak pose, where it is re-measured.
//! 4. The session ends at the global peak, and the record is persisted. This
//!    also happens on cancellation, on a best-effort basis.
//!
//! The global peak only ever increases: every sample that beats it replaces
//! it, wherever in the session it was taken.

use crate::measurement::MeasurementReader;
use crate::parameters::ScanningParameters;
use crate::peak::{PeakData, ScanDirection, ScanMeasurement};
use crate::progress::{ScanProgress, PROGRESS_CHANNEL_CAPACITY};
use crate::record::{ScanOutcome, ScanSessionRecord, ScanStatus};
use crate::statistics::ScanStatistics;
use crate::storage::ScanStorage;
use chrono::Utc;
use station_core::limits::{relative_decrease, relative_shortfall, RELATIVE_EPSILON};
use station_core::{
    Axis, CommandContext, DeviceId, DeviceMovement, MeasurementSource, Position, StationError,
    StationResult,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Why a direction scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Too many samples in a row without a new maximum
    ConsecutiveDecreases,
    /// A single step lost more than the significant-decrease threshold
    SignificantDecrease,
    /// The next step would exceed the travel limit
    MaxDistance,
}

/// Result of scanning one direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionResult {
    /// Best value found
    pub max_value: f64,
    /// Pose of the best value
    pub max_position: Position,
    /// Steps taken
    pub steps: usize,
    /// Why the scan stopped
    pub stop: StopReason,
}

/// Peak search for one device and channel.
///
/// [`PeakSearch::run`] may be called repeatedly; every call is a new session
/// with its own scan id.
pub struct PeakSearch {
    device: DeviceId,
    params: ScanningParameters,
    motion: Arc<dyn DeviceMovement>,
    reader: MeasurementReader,
    storage: Arc<dyn ScanStorage>,
    progress: broadcast::Sender<ScanProgress>,
}

impl std::fmt::Debug for PeakSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeakSearch")
            .field("device", &self.device)
            .field("params", &self.params)
            .field("reader", &self.reader)
            .finish()
    }
}

impl PeakSearch {
    /// Search over `device` maximizing `params.channel` of `measurement`.
    pub fn new(
        device: DeviceId,
        params: ScanningParameters,
        motion: Arc<dyn DeviceMovement>,
        measurement: Arc<dyn MeasurementSource>,
        storage: Arc<dyn ScanStorage>,
    ) -> Self {
        let reader = MeasurementReader::new(
            measurement,
            params.channel.clone(),
            params.measurement_timeout,
            params.measurement_poll_interval,
        );
        let (progress, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            device,
            params,
            motion,
            reader,
            storage,
            progress,
        }
    }

    /// Scanned device.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Parameters in use.
    pub fn parameters(&self) -> &ScanningParameters {
        &self.params
    }

    /// Subscribe to progress events of future sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    /// Run one session.
    ///
    /// On cancellation the device is moved back to the global peak if
    /// possible and the record is persisted with status `Cancelled` before
    /// the cancellation error is returned.
    #[instrument(skip_all, fields(device = %self.device, channel = %self.params.channel))]
    pub async fn run(&self, ctx: &CommandContext) -> StationResult<ScanOutcome> {
        self.params.validate_for(self.device)?;
        if !self.motion.is_connected(self.device).await {
            return Err(StationError::NotConnected(self.device.to_string()));
        }

        let scan_id = Uuid::new_v4();
        let start_time = Utc::now();
        let started = Instant::now();

        let position = self.read_position().await?;
        let (value, unit) = self.reader.read(ctx.token()).await?;
        let baseline = PeakData {
            value,
            position,
            timestamp: Utc::now(),
            context: "baseline".to_string(),
        };
        info!(%scan_id, baseline = value, %position, "Scan session started");
        self.emit(ScanProgress::Started {
            scan_id,
            device: self.device,
            baseline: value,
        });

        let mut session = Session {
            search: self,
            ctx,
            current: position,
            current_value: value,
            global_peak: baseline.clone(),
            measurements: vec![ScanMeasurement {
                value,
                position,
                timestamp: baseline.timestamp,
                axis: None,
                step_size: None,
                direction: None,
            }],
        };

        let mut result = session.search().await;
        if let Err(e) = session.finish_at_peak().await {
            if result.is_ok() {
                warn!(error = %e, "Could not move to peak after scan");
                result = Err(e);
            } else {
                warn!(error = %e, "Could not return to peak after interrupted scan");
            }
        }
        let final_position = session.current;
        let status = match &result {
            Ok(()) => ScanStatus::Completed,
            Err(e) if e.is_cancelled() => ScanStatus::Cancelled,
            Err(_) => ScanStatus::Failed,
        };

        let Session {
            global_peak,
            measurements,
            ..
        } = session;
        let statistics = ScanStatistics::compute(
            &measurements,
            baseline.value,
            global_peak.value,
            started.elapsed(),
        );
        let record = ScanSessionRecord {
            device_id: self.device,
            scan_id,
            start_time,
            end_time: Utc::now(),
            status,
            error: result.as_ref().err().map(ToString::to_string),
            unit,
            baseline: baseline.clone(),
            peak: global_peak.clone(),
            measurements,
            statistics: statistics.clone(),
            parameters: self.params.clone(),
        };

        let persisted = self.storage.persist(&record).await;
        self.emit(ScanProgress::Finished {
            status,
            peak: global_peak.value,
        });

        match result {
            Ok(()) => {
                let record_path = persisted?;
                info!(
                    %scan_id,
                    baseline = baseline.value,
                    peak = global_peak.value,
                    measurements = statistics.count,
                    "Scan session completed"
                );
                Ok(ScanOutcome {
                    scan_id,
                    baseline,
                    peak: global_peak,
                    statistics,
                    final_position,
                    record_path,
                })
            }
            Err(e) => {
                if let Err(storage_error) = persisted {
                    warn!(error = %storage_error, "Could not persist interrupted scan");
                }
                warn!(%scan_id, status = ?status, error = %e, "Scan session ended early");
                Err(e)
            }
        }
    }

    async fn read_position(&self) -> StationResult<Position> {
        self.motion
            .current_position(self.device)
            .await
            .map_err(|e| StationError::motion(self.device, format!("{:#}", e)))
    }

    fn emit(&self, event: ScanProgress) {
        // No subscribers is fine.
        let _ = self.progress.send(event);
    }
}

/// Mutable state of one running session.
struct Session<'a> {
    search: &'a PeakSearch,
    ctx: &'a CommandContext,
    current: Position,
    current_value: f64,
    global_peak: PeakData,
    measurements: Vec<ScanMeasurement>,
}

impl Session<'_> {
    async fn search(&mut self) -> StationResult<()> {
        let search = self.search;
        let params = &search.params;
        for &step in &params.step_sizes {
            for &axis in &params.axes {
                self.ctx.checkpoint().await?;
                self.scan_axis(axis, step).await?;
                self.check_drift().await?;
            }
            debug!(step, peak = self.global_peak.value, "Step size completed");
            search.emit(ScanProgress::StepSizeCompleted {
                step_size: step,
                peak: self.global_peak.value,
            });
        }
        Ok(())
    }

    /// Probe both directions of `axis` and settle on the better one.
    async fn scan_axis(&mut self, axis: Axis, step: f64) -> StationResult<()> {
        let origin = self.current;

        let positive = self.scan_direction(axis, step, ScanDirection::Positive).await?;

        self.move_to(origin).await?;
        self.settle_and_measure(Some(axis), Some(step), None).await?;

        let negative = self.scan_direction(axis, step, ScanDirection::Negative).await?;

        let (best, direction) = if positive.max_value >= negative.max_value {
            (positive, ScanDirection::Positive)
        } else {
            (negative, ScanDirection::Negative)
        };
        debug!(
            %axis,
            step,
            %direction,
            positive = positive.max_value,
            negative = negative.max_value,
            "Axis scanned"
        );

        if self.current != best.max_position {
            self.move_to(best.max_position).await?;
            self.settle_and_measure(Some(axis), Some(step), None).await?;
        }
        Ok(())
    }

    /// Step along `axis` in `direction` while the signal keeps improving.
    async fn scan_direction(
        &mut self,
        axis: Axis,
        step: f64,
        direction: ScanDirection,
    ) -> StationResult<DirectionResult> {
        let search = self.search;
        let params = &search.params;
        let mut max_value = self.current_value;
        let mut max_position = self.current;
        let mut previous = self.current_value;
        let mut consecutive_decreases = 0u32;
        let mut moved_away = false;
        let mut travelled = 0.0;
        let mut steps = 0;

        let stop = loop {
            if travelled + step > params.max_total_distance + RELATIVE_EPSILON {
                break StopReason::MaxDistance;
            }
            self.ctx.checkpoint().await?;
            self.step(axis, direction.sign() * step).await?;
            travelled += step;
            steps += 1;

            let value = self
                .settle_and_measure(Some(axis), Some(step), Some(direction))
                .await?;

            if value > max_value {
                max_value = value;
                max_position = self.current;
                consecutive_decreases = 0;
                moved_away = false;
            } else {
                consecutive_decreases += 1;
                moved_away = true;
            }

            if consecutive_decreases >= params.consecutive_decreases_limit {
                break StopReason::ConsecutiveDecreases;
            }
            if relative_decrease(previous, value)
                .is_some_and(|drop| drop > params.significant_decrease_threshold)
            {
                break StopReason::SignificantDecrease;
            }
            previous = value;
        };

        if moved_away {
            self.move_to(max_position).await?;
            let remeasured = self.settle_and_measure(Some(axis), Some(step), None).await?;
            max_value = max_value.max(remeasured);
        }

        debug!(%axis, step, %direction, steps, ?stop, max_value, "Direction scanned");
        Ok(DirectionResult {
            max_value,
            max_position,
            steps,
            stop,
        })
    }

    /// Return to the global peak when the signal has drifted too far below it.
    async fn check_drift(&mut self) -> StationResult<()> {
        let threshold = self.search.params.improvement_threshold;
        let Some(drop) = relative_shortfall(self.global_peak.value, self.current_value) else {
            return Ok(());
        };
        if drop <= threshold {
            return Ok(());
        }

        let from_value = self.current_value;
        info!(
            current = from_value,
            peak = self.global_peak.value,
            drop,
            "Signal drifted below peak, returning"
        );
        let peak_position = self.global_peak.position;
        self.move_to(peak_position).await?;
        let verified_value = self.settle_and_measure(None, None, None).await?;
        self.search.emit(ScanProgress::ReturnedToPeak {
            from_value,
            verified_value,
        });
        Ok(())
    }

    /// Leave the device at the global peak with one absolute move.
    async fn finish_at_peak(&mut self) -> StationResult<()> {
        let peak = self.global_peak.position;
        debug!(%peak, "Moving to global peak");
        self.move_to(peak).await
    }

    async fn step(&mut self, axis: Axis, delta: f64) -> StationResult<()> {
        let device = self.search.device;
        self.search
            .motion
            .move_relative(device, axis, delta)
            .await
            .map_err(|e| StationError::motion(device, format!("{:#}", e)))?;
        self.current = self.search.read_position().await?;
        Ok(())
    }

    async fn move_to(&mut self, target: Position) -> StationResult<()> {
        let device = self.search.device;
        self.search
            .motion
            .move_to_absolute(device, target)
            .await
            .map_err(|e| StationError::motion(device, format!("{:#}", e)))?;
        self.current = target;
        Ok(())
    }

    /// Settle, take one reading, append it to the log and update the peak.
    async fn settle_and_measure(
        &mut self,
        axis: Option<Axis>,
        step_size: Option<f64>,
        direction: Option<ScanDirection>,
    ) -> StationResult<f64> {
        self.ctx.sleep(self.search.params.settle_time).await?;
        let (value, _) = self.search.reader.read(self.ctx.token()).await?;

        let sample = ScanMeasurement {
            value,
            position: self.current,
            timestamp: Utc::now(),
            axis,
            step_size,
            direction,
        };
        self.search.emit(ScanProgress::Measurement {
            index: self.measurements.len(),
            value,
            axis,
            direction,
        });

        if value > self.global_peak.value {
            self.global_peak = PeakData {
                value,
                position: self.current,
                timestamp: sample.timestamp,
                context: sample.context(),
            };
            debug!(value, position = %self.current, "New global peak");
            self.search.emit(ScanProgress::PeakUpdated {
                value,
                position: self.current,
            });
        }

        self.measurements.push(sample);
        self.current_value = value;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use station_core::{CancelToken, HexapodLocation};
    use station_hardware::drivers::{CouplingModel, MoveKind, SimulatedMeasurement, SimulatedMotion};
    use std::time::Duration;

    const LEFT: DeviceId = DeviceId::Hexapod(HexapodLocation::Left);

    struct Rig {
        motion: Arc<SimulatedMotion>,
        measurement: Arc<SimulatedMeasurement>,
        storage: Arc<MemoryStorage>,
    }

    fn rig(optimum: Position, waist: f64) -> Rig {
        let motion = SimulatedMotion::new(Duration::ZERO);
        motion.add_device(LEFT, Position::ORIGIN);
        let measurement = SimulatedMeasurement::new(motion.clone());
        measurement.add_channel(
            "power",
            CouplingModel {
                device: LEFT,
                optimum,
                peak_value: 1.0,
                beam_waist: waist,
                angular_width: 0.5,
                noise: 0.0,
                unit: "mW".into(),
            },
        );
        Rig {
            motion,
            measurement,
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    fn params(axes: Vec<Axis>, steps: Vec<f64>) -> ScanningParameters {
        ScanningParameters {
            channel: "power".into(),
            axes,
            step_sizes: steps,
            settle_time: Duration::ZERO,
            max_total_distance: 0.2,
            ..ScanningParameters::default()
        }
    }

    fn search(rig: &Rig, params: ScanningParameters) -> PeakSearch {
        PeakSearch::new(
            LEFT,
            params,
            rig.motion.clone(),
            rig.measurement.clone(),
            rig.storage.clone(),
        )
    }

    fn ctx() -> CommandContext {
        CommandContext::detached(CancelToken::new())
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_converges_near_optimum_and_ends_at_peak() {
        let rig = rig(Position::translation(0.023, -0.011, 0.004), 0.05);
        let search = search(
            &rig,
            params(vec![Axis::X, Axis::Y, Axis::Z], vec![0.01, 0.002]),
        );
        let outcome = search.run(&ctx()).await.unwrap();

        assert!(outcome.peak.value > outcome.baseline.value);
        assert!(outcome.peak.value > 0.99);
        assert_eq!(outcome.final_position, outcome.peak.position);
        assert_eq!(rig.motion.pose(LEFT), Some(outcome.peak.position));

        let records = rig.storage.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ScanStatus::Completed);
        assert_eq!(records[0].measurements.len(), outcome.statistics.count);
        assert!(logs_contain("Scan session completed"));
    }

    #[tokio::test]
    async fn test_peak_is_monotone_and_is_log_maximum() {
        let rig = rig(Position::translation(0.03, 0.0, 0.0), 0.04);
        let search = search(&rig, params(vec![Axis::X, Axis::Y], vec![0.01]));
        let mut events = search.subscribe();
        let outcome = search.run(&ctx()).await.unwrap();

        let mut last_peak = f64::NEG_INFINITY;
        while let Ok(event) = events.try_recv() {
            if let ScanProgress::PeakUpdated { value, .. } = event {
                assert!(value > last_peak);
                last_peak = value;
            }
        }
        let record = &rig.storage.records()[0];
        let log_max = record
            .measurements
            .iter()
            .map(|m| m.value)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(outcome.peak.value, log_max);
        assert_eq!(last_peak, log_max);
    }

    #[tokio::test]
    async fn test_direction_stops_after_three_decreases_and_returns() {
        // Peak two steps along +X. Narrow beam so every further step is worse.
        let rig = rig(Position::translation(0.02, 0.0, 0.0), 0.05);
        let mut p = params(vec![Axis::X], vec![0.01]);
        p.significant_decrease_threshold = 1.0;
        p.max_total_distance = 1.0;
        let search = search(&rig, p);

        let mut session = Session {
            search: &search,
            ctx: &ctx(),
            current: Position::ORIGIN,
            current_value: rig
                .measurement
                .try_channel_value("power")
                .await
                .unwrap()
                .unwrap()
                .value,
            global_peak: PeakData {
                value: 0.0,
                position: Position::ORIGIN,
                timestamp: Utc::now(),
                context: "baseline".into(),
            },
            measurements: Vec::new(),
        };

        let result = session
            .scan_direction(Axis::X, 0.01, ScanDirection::Positive)
            .await
            .unwrap();
        assert_eq!(result.stop, StopReason::ConsecutiveDecreases);
        assert_eq!(result.steps, 5);
        assert!((result.max_position.x - 0.02).abs() < 1e-9);
        // five steps plus the re-measure at the local best
        assert_eq!(session.measurements.len(), 6);
        assert!((rig.motion.pose(LEFT).unwrap().x - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_significant_decrease_stops_direction() {
        let rig = rig(Position::ORIGIN, 0.01);
        let search = search(&rig, params(vec![Axis::X], vec![0.01]));
        let mut session = Session {
            search: &search,
            ctx: &ctx(),
            current: Position::ORIGIN,
            current_value: 1.0,
            global_peak: PeakData {
                value: 1.0,
                position: Position::ORIGIN,
                timestamp: Utc::now(),
                context: "baseline".into(),
            },
            measurements: Vec::new(),
        };
        let result = session
            .scan_direction(Axis::X, 0.01, ScanDirection::Positive)
            .await
            .unwrap();
        assert_eq!(result.stop, StopReason::SignificantDecrease);
        assert_eq!(result.steps, 1);
        assert_eq!(result.max_position, Position::ORIGIN);
    }

    #[tokio::test]
    async fn test_travel_never_exceeds_limit() {
        // Signal rises the whole way, so only the distance limit stops it.
        let rig = rig(Position::translation(5.0, 0.0, 0.0), 10.0);
        let mut p = params(vec![Axis::X], vec![0.05]);
        p.max_total_distance = 0.12;
        let search = search(&rig, p);
        let mut session = Session {
            search: &search,
            ctx: &ctx(),
            current: Position::ORIGIN,
            current_value: 0.0,
            global_peak: PeakData {
                value: 0.0,
                position: Position::ORIGIN,
                timestamp: Utc::now(),
                context: "baseline".into(),
            },
            measurements: Vec::new(),
        };
        let result = session
            .scan_direction(Axis::X, 0.05, ScanDirection::Positive)
            .await
            .unwrap();
        assert_eq!(result.stop, StopReason::MaxDistance);
        assert_eq!(result.steps, 2);
        assert!(rig.motion.pose(LEFT).unwrap().x <= 0.12);
    }

    #[tokio::test]
    async fn test_drift_returns_to_global_peak() {
        let rig = rig(Position::ORIGIN, 0.05);
        let away = Position::translation(0.05, 0.0, 0.0);
        rig.motion.set_pose(LEFT, away);
        let search = search(&rig, params(vec![Axis::X], vec![0.01]));
        let mut events = search.subscribe();
        let mut session = Session {
            search: &search,
            ctx: &ctx(),
            current: away,
            current_value: 0.6,
            global_peak: PeakData {
                value: 1.0,
                position: Position::ORIGIN,
                timestamp: Utc::now(),
                context: "baseline".into(),
            },
            measurements: Vec::new(),
        };
        session.check_drift().await.unwrap();
        assert_eq!(rig.motion.pose(LEFT), Some(Position::ORIGIN));
        assert_eq!(session.measurements.len(), 1);
        assert!(matches!(
            events.try_recv(),
            Ok(ScanProgress::Measurement { .. })
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(ScanProgress::ReturnedToPeak { from_value, .. }) if from_value == 0.6
        ));

        // within threshold: stays put
        session.current_value = 0.97;
        session.check_drift().await.unwrap();
        assert_eq!(session.measurements.len(), 1);
    }

    #[tokio::test]
    async fn test_drift_compares_shortfall_against_current_value() {
        // (1.0 - 0.95) / 0.95 exceeds 0.052 although (1.0 - 0.95) / 1.0 does not.
        let rig = rig(Position::ORIGIN, 0.05);
        let away = Position::translation(0.01, 0.0, 0.0);
        rig.motion.set_pose(LEFT, away);
        let mut p = params(vec![Axis::X], vec![0.01]);
        p.improvement_threshold = 0.052;
        let search = search(&rig, p);
        let mut session = Session {
            search: &search,
            ctx: &ctx(),
            current: away,
            current_value: 0.95,
            global_peak: PeakData {
                value: 1.0,
                position: Position::ORIGIN,
                timestamp: Utc::now(),
                context: "baseline".into(),
            },
            measurements: Vec::new(),
        };
        session.check_drift().await.unwrap();
        assert_eq!(rig.motion.pose(LEFT), Some(Position::ORIGIN));
        assert_eq!(session.measurements.len(), 1);
    }

    /// Fails the `fail_at`-th absolute move and passes everything else through.
    struct FailingAbsoluteMove {
        inner: Arc<SimulatedMotion>,
        fail_at: usize,
        absolute_moves: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DeviceMovement for FailingAbsoluteMove {
        async fn move_to_absolute(&self, device: DeviceId, target: Position) -> anyhow::Result<()> {
            let n = self
                .absolute_moves
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            if n == self.fail_at {
                anyhow::bail!("following error on final move");
            }
            self.inner.move_to_absolute(device, target).await
        }

        async fn move_relative(&self, device: DeviceId, axis: Axis, delta: f64) -> anyhow::Result<()> {
            self.inner.move_relative(device, axis, delta).await
        }

        async fn current_position(&self, device: DeviceId) -> anyhow::Result<Position> {
            self.inner.current_position(device).await
        }

        async fn is_connected(&self, device: DeviceId) -> bool {
            self.inner.is_connected(device).await
        }
    }

    #[tokio::test]
    async fn test_failed_final_move_persists_failed_record() {
        let optimum = Position::translation(0.02, 0.0, 0.0);
        let p = params(vec![Axis::X], vec![0.01]);

        // Noise-free, so a healthy run shows how many absolute moves a session issues.
        let healthy = rig(optimum, 0.05);
        search(&healthy, p.clone()).run(&ctx()).await.unwrap();
        let absolute_moves = healthy
            .motion
            .moves_of(LEFT)
            .iter()
            .filter(|m| m.kind == MoveKind::Absolute)
            .count();

        let rig = rig(optimum, 0.05);
        let motion = Arc::new(FailingAbsoluteMove {
            inner: rig.motion.clone(),
            fail_at: absolute_moves,
            absolute_moves: std::sync::atomic::AtomicUsize::new(0),
        });
        let search = PeakSearch::new(
            LEFT,
            p,
            motion,
            rig.measurement.clone(),
            rig.storage.clone(),
        );
        let err = search.run(&ctx()).await.unwrap_err();
        assert!(matches!(err, StationError::Motion { .. }), "{err:?}");

        let records = rig.storage.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.status, ScanStatus::Failed);
        assert!(record
            .error
            .as_deref()
            .is_some_and(|e| e.contains("following error")));
        let healthy_record = &healthy.storage.records()[0];
        assert_eq!(record.measurements.len(), healthy_record.measurements.len());
        assert_eq!(record.peak.value, healthy_record.peak.value);
    }

    #[tokio::test]
    async fn test_cancel_returns_to_peak_and_persists() {
        let rig = rig(Position::translation(0.02, 0.0, 0.0), 0.05);
        let mut p = params(vec![Axis::X, Axis::Y, Axis::Z], vec![0.01, 0.005, 0.001]);
        p.settle_time = Duration::from_millis(10);
        let search = Arc::new(search(&rig, p));

        let token = CancelToken::new();
        let runner = {
            let search = Arc::clone(&search);
            let ctx = CommandContext::detached(token.clone());
            tokio::spawn(async move { search.run(&ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(80)).await;
        token.cancel();

        let err = runner.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        let records = rig.storage.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ScanStatus::Cancelled);
        assert_eq!(rig.motion.pose(LEFT), Some(records[0].peak.position));
    }

    #[tokio::test]
    async fn test_measurement_timeout_fails_session() {
        let rig = rig(Position::ORIGIN, 0.05);
        rig.measurement.inject_invalid_readings(10_000);
        let mut p = params(vec![Axis::X], vec![0.01]);
        p.measurement_timeout = Duration::from_millis(50);
        let search = search(&rig, p);
        let err = search.run(&ctx()).await.unwrap_err();
        assert_eq!(err.kind(), station_core::ErrorKind::Timeout);
        // no baseline, nothing to persist
        assert!(rig.storage.records().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_parameters() {
        let rig = rig(Position::ORIGIN, 0.05);
        let search = search(&rig, params(vec![Axis::X], vec![]));
        let err = search.run(&ctx()).await.unwrap_err();
        assert!(matches!(err, StationError::InvalidParameters(_)));
    }
}
