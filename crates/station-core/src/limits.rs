//! Shared timing and tolerance constants.
//!
//! This module centralizes:
//! - Poll intervals for pause, input and measurement loops
//! - Confirmation timeouts for slides and input waits
//! - The named-position match tolerance
//!
//! Per-operation overrides live in configuration; these are the defaults.

use std::time::Duration;

// =============================================================================
// Poll intervals
// =============================================================================

/// Interval at which a paused command re-checks its pause flag (100 ms).
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Interval between digital input samples while waiting for a state (50 ms).
pub const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Interval between measurement channel polls (10 ms).
pub const MEASUREMENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Interval at which an in-flight slide request re-checks the sensors (50 ms).
pub const SLIDE_POLL_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Timeouts
// =============================================================================

/// Time allowed for a pneumatic slide to confirm its target state (10 s).
pub const SLIDE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for a digital input to reach its expected state (30 s).
pub const INPUT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed to acquire one valid measurement (1 s).
pub const MEASUREMENT_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Tolerances
// =============================================================================

/// Maximum distance (length units) at which a device counts as being at a
/// named position.
pub const POSITION_TOLERANCE: f64 = 0.1;

/// Remaining time below which the precise timer stops sleeping and yields.
pub const PRECISE_SPIN_WINDOW: Duration = Duration::from_millis(2);

/// Relative comparisons treat denominators smaller than this as zero.
pub const RELATIVE_EPSILON: f64 = 1e-12;

/// Relative change `(reference - current) / reference`.
///
/// Returns `None` when the reference is effectively zero or the two values
/// sit on opposite sides of zero, since the ratio has no meaning there.
pub fn relative_decrease(reference: f64, current: f64) -> Option<f64> {
    if !reference.is_finite() || !current.is_finite() || reference.abs() < RELATIVE_EPSILON {
        return None;
    }
    if reference.signum() != current.signum() && current != 0.0 {
        return None;
    }
    Some((reference - current) / reference.abs())
}

/// Shortfall of `current` below `peak`, relative to `current`:
/// `(peak - current) / current`.
///
/// Returns `None` when `current` is effectively zero or the two values sit on
/// opposite sides of zero.
pub fn relative_shortfall(peak: f64, current: f64) -> Option<f64> {
    if !peak.is_finite() || !current.is_finite() || current.abs() < RELATIVE_EPSILON {
        return None;
    }
    if peak.signum() != current.signum() && peak != 0.0 {
        return None;
    }
    Some((peak - current) / current.abs())
}
