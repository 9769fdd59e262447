//! Summary statistics of a session's measurements.

use crate::peak::ScanMeasurement;
use serde::{Deserialize, Serialize};
use station_core::limits::relative_decrease;
use station_core::Axis;
use std::collections::BTreeMap;
use std::time::Duration;

/// Aggregates over the measurement log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Number of samples
    pub count: usize,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Samples taken while scanning each axis
    pub per_axis_counts: BTreeMap<Axis, usize>,
    /// Relative gain of the peak over the baseline, when comparable
    pub improvement_from_baseline: Option<f64>,
    /// Session duration
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl ScanStatistics {
    /// Compute statistics. `baseline` and `peak` are the session's values.
    pub fn compute(
        measurements: &[ScanMeasurement],
        baseline: f64,
        peak: f64,
        duration: Duration,
    ) -> Self {
        let count = measurements.len();
        let mut per_axis_counts = BTreeMap::new();
        for m in measurements {
            if let Some(axis) = m.axis {
                *per_axis_counts.entry(axis).or_insert(0) += 1;
            }
        }

        let (min, max, mean, std_dev) = if count == 0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let values = measurements.iter().map(|m| m.value);
            let min = values.clone().fold(f64::INFINITY, f64::min);
            let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.clone().sum::<f64>() / count as f64;
            let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
            (min, max, mean, variance.sqrt())
        };

        Self {
            count,
            min,
            max,
            mean,
            std_dev,
            per_axis_counts,
            improvement_from_baseline: relative_decrease(baseline, peak).map(|d| -d),
            duration,
        }
    }
}
