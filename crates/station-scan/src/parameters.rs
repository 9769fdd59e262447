//! Runtime scanning parameters.

use serde::{Deserialize, Serialize};
use station_core::{Axis, DeviceId, StationError, StationResult};
use station_hardware::config::ScanningConfig;
use std::time::Duration;

/// Parameters of one peak-search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanningParameters {
    /// Measurement channel to maximize
    pub channel: String,
    /// Axes scanned in order
    pub axes: Vec<Axis>,
    /// Step sizes, coarse to fine
    pub step_sizes: Vec<f64>,
    /// Largest permitted step size
    pub max_step_size: f64,
    /// Dwell after each move before measuring
    #[serde(with = "humantime_serde")]
    pub settle_time: Duration,
    /// Consecutive non-improving samples that end a direction
    pub consecutive_decreases_limit: u32,
    /// Relative drop from the global peak that triggers a return to it
    pub improvement_threshold: f64,
    /// Relative drop between consecutive samples that ends a direction
    pub significant_decrease_threshold: f64,
    /// Maximum travel per direction
    pub max_total_distance: f64,
    /// Time allowed to obtain one valid reading
    #[serde(with = "humantime_serde")]
    pub measurement_timeout: Duration,
    /// Interval between reading attempts
    #[serde(with = "humantime_serde")]
    pub measurement_poll_interval: Duration,
}

impl Default for ScanningParameters {
    fn default() -> Self {
        Self::from(&ScanningConfig::default())
    }
}

impl From<&ScanningConfig> for ScanningParameters {
    fn from(config: &ScanningConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            axes: config.axes.clone(),
            step_sizes: config.step_sizes.clone(),
            max_step_size: config.max_step_size,
            settle_time: config.settle_time,
            consecutive_decreases_limit: config.consecutive_decreases_limit,
            improvement_threshold: config.improvement_threshold,
            significant_decrease_threshold: config.significant_decrease_threshold,
            max_total_distance: config.max_total_distance,
            measurement_timeout: config.measurement_timeout,
            measurement_poll_interval: config.measurement_poll_interval,
        }
    }
}

impl ScanningParameters {
    /// Check internal consistency.
    pub fn validate(&self) -> StationResult<()> {
        let mut errors = Vec::new();

        if self.channel.is_empty() {
            errors.push("channel must not be empty".to_string());
        }
        if self.axes.is_empty() {
            errors.push("at least one axis is required".to_string());
        }
        if self.step_sizes.is_empty() {
            errors.push("at least one step size is required".to_string());
        }
        if !(self.max_step_size.is_finite() && self.max_step_size > 0.0) {
            errors.push(format!("max_step_size {} must be positive", self.max_step_size));
        }
        for step in &self.step_sizes {
            if !(*step > 0.0 && *step <= self.max_step_size) {
                errors.push(format!(
                    "step size {} outside (0, {}]",
                    step, self.max_step_size
                ));
            }
        }
        if self.consecutive_decreases_limit < 1 {
            errors.push("consecutive_decreases_limit must be at least 1".to_string());
        }
        for (name, value) in [
            ("improvement_threshold", self.improvement_threshold),
            (
                "significant_decrease_threshold",
                self.significant_decrease_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} {} outside [0, 1]", name, value));
            }
        }
        if !(self.max_total_distance.is_finite() && self.max_total_distance > 0.0) {
            errors.push(format!(
                "max_total_distance {} must be positive",
                self.max_total_distance
            ));
        }
        if self.measurement_poll_interval.is_zero() {
            errors.push("measurement_poll_interval must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(StationError::InvalidParameters(errors.join("; ")))
        }
    }

    /// Validate, and check that `device` can drive every scanned axis.
    pub fn validate_for(&self, device: DeviceId) -> StationResult<()> {
        self.validate()?;
        if let Some(axis) = self.axes.iter().find(|a| !device.supports_axis(**a)) {
            return Err(StationError::InvalidParameters(format!(
                "device '{}' cannot scan axis {}",
                device, axis
            )));
        }
        Ok(())
    }
}

impl TryFrom<ScanningConfig> for ScanningParameters {
    type Error = StationError;

    fn try_from(config: ScanningConfig) -> StationResult<Self> {
        let params = Self::from(&config);
        params.validate()?;
        Ok(params)
    }
}
