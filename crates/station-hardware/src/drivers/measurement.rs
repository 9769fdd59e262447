//! Simulated optical coupling measurement.
//!
//! The signal is a Gaussian of the coupling device's pose around an optimum:
//!
//! ```text
//! value = peak * exp(-|dT|^2 / (2 * waist^2)) * exp(-|dR|^2 / (2 * angular^2))
//! ```
//!
//! where `dT` is the translational offset and `dR` the rotational offset.

use super::motion::SimulatedMotion;
use crate::config::SimulationConfig;
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use station_core::{ChannelReading, DeviceId, MeasurementSource, Position};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Parameters of one simulated channel.
#[derive(Debug, Clone)]
pub struct CouplingModel {
    /// Device whose pose drives the signal
    pub device: DeviceId,
    /// Pose of maximum signal
    pub optimum: Position,
    /// Signal at the optimum
    pub peak_value: f64,
    /// Gaussian width over translation
    pub beam_waist: f64,
    /// Gaussian width over rotation
    pub angular_width: f64,
    /// Noise standard deviation relative to peak
    pub noise: f64,
    /// Unit label
    pub unit: String,
}

impl CouplingModel {
    /// Model from the `[simulation]` configuration section.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            device: config.coupling_device,
            optimum: config.optimum,
            peak_value: config.peak_value,
            beam_waist: config.beam_waist,
            angular_width: config.angular_width,
            noise: config.noise,
            unit: config.unit.clone(),
        }
    }

    /// Noise-free signal at `pose`.
    pub fn ideal_value(&self, pose: &Position) -> f64 {
        let dt2 = pose.translational_distance(&self.optimum).powi(2);
        let dr2 = (pose.u - self.optimum.u).powi(2)
            + (pose.v - self.optimum.v).powi(2)
            + (pose.w - self.optimum.w).powi(2);
        self.peak_value
            * (-dt2 / (2.0 * self.beam_waist * self.beam_waist)).exp()
            * (-dr2 / (2.0 * self.angular_width * self.angular_width)).exp()
    }
}

/// Simulated measurement channels reading poses from a [`SimulatedMotion`].
pub struct SimulatedMeasurement {
    motion: Arc<SimulatedMotion>,
    channels: Mutex<HashMap<String, CouplingModel>>,
    invalid_remaining: AtomicUsize,
    unavailable: AtomicBool,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for SimulatedMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedMeasurement")
            .field("channels", &self.channels.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SimulatedMeasurement {
    /// No channels yet.
    pub fn new(motion: Arc<SimulatedMotion>) -> Arc<Self> {
        Self::with_seed(motion, 0x5eed)
    }

    /// No channels yet, with a fixed noise seed.
    pub fn with_seed(motion: Arc<SimulatedMotion>, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            motion,
            channels: Mutex::new(HashMap::new()),
            invalid_remaining: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Add or replace a channel.
    pub fn add_channel(&self, channel: impl Into<String>, model: CouplingModel) {
        self.channels.lock().insert(channel.into(), model);
    }

    /// Report the next `count` readings as invalid.
    pub fn inject_invalid_readings(&self, count: usize) {
        self.invalid_remaining.store(count, Ordering::SeqCst);
    }

    /// Return no reading at all while `unavailable` is true.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn gaussian_noise(&self, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return 0.0;
        }
        // Box-Muller
        let mut rng = self.rng.lock();
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

#[async_trait]
impl MeasurementSource for SimulatedMeasurement {
    async fn try_channel_value(&self, channel: &str) -> Result<Option<ChannelReading>> {
        let Some(model) = self.channels.lock().get(channel).cloned() else {
            bail!("unknown channel '{}'", channel);
        };
        if self.unavailable.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let Some(pose) = self.motion.pose(model.device) else {
            bail!("coupling device {} is not simulated", model.device);
        };

        let value = model.ideal_value(&pose) + self.gaussian_noise(model.noise * model.peak_value);
        let is_valid = self
            .invalid_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err();

        Ok(Some(ChannelReading {
            value,
            unit: model.unit,
            is_valid,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_core::HexapodLocation;
    use std::time::Duration;

    fn model(device: DeviceId) -> CouplingModel {
        CouplingModel {
            device,
            optimum: Position::new(0.1, -0.05, 0.0, 0.0, 0.0, 0.0),
            peak_value: 2.0,
            beam_waist: 0.05,
            angular_width: 0.5,
            noise: 0.0,
            unit: "mW".into(),
        }
    }

    #[tokio::test]
    async fn test_signal_peaks_at_optimum() {
        let hex = DeviceId::Hexapod(HexapodLocation::Left);
        let motion = SimulatedMotion::new(Duration::ZERO);
        motion.add_device(hex, Position::ORIGIN);
        let meter = SimulatedMeasurement::new(motion.clone());
        meter.add_channel("power", model(hex));

        let off = meter.try_channel_value("power").await.unwrap().unwrap();
        motion.set_pose(hex, Position::new(0.1, -0.05, 0.0, 0.0, 0.0, 0.0));
        let on = meter.try_channel_value("power").await.unwrap().unwrap();

        assert!(on.is_valid);
        assert!((on.value - 2.0).abs() < 1e-12);
        assert!(off.value < on.value);
        assert_eq!(on.unit, "mW");
    }

    #[tokio::test]
    async fn test_injected_invalid_readings_then_valid() {
        let hex = DeviceId::Hexapod(HexapodLocation::Left);
        let motion = SimulatedMotion::new(Duration::ZERO);
        motion.add_device(hex, Position::ORIGIN);
        let meter = SimulatedMeasurement::new(motion);
        meter.add_channel("power", model(hex));
        meter.inject_invalid_readings(2);

        assert!(!meter.try_channel_value("power").await.unwrap().unwrap().is_valid);
        assert!(!meter.try_channel_value("power").await.unwrap().unwrap().is_valid);
        assert!(meter.try_channel_value("power").await.unwrap().unwrap().is_valid);
        assert!(meter.try_channel_value("missing").await.is_err());
    }
}
