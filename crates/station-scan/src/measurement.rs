//! Polling acquisition of single readings.

use station_core::{CancelToken, MeasurementSource, StationError, StationResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Reads one valid value from a measurement channel.
///
/// Missing, invalid and non-finite readings are retried every poll interval
/// until the timeout. A failed acquisition is always an error and never a
/// substituted value.
#[derive(Clone)]
pub struct MeasurementReader {
    source: Arc<dyn MeasurementSource>,
    channel: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for MeasurementReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementReader")
            .field("channel", &self.channel)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl MeasurementReader {
    /// Reader for `channel`.
    pub fn new(
        source: Arc<dyn MeasurementSource>,
        channel: impl Into<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            channel: channel.into(),
            timeout,
            poll_interval,
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Acquire one valid reading, returning its value and unit.
    pub async fn read(&self, token: &CancelToken) -> StationResult<(f64, String)> {
        let start = Instant::now();
        let mut attempts = 0u32;
        loop {
            if token.is_cancelled() {
                return Err(StationError::Cancelled(format!(
                    "measurement on '{}' interrupted",
                    self.channel
                )));
            }
            attempts += 1;
            let reading = self
                .source
                .try_channel_value(&self.channel)
                .await
                .map_err(|e| StationError::measurement(&self.channel, format!("{:#}", e)))?;
            match reading {
                Some(r) if r.is_valid && r.value.is_finite() => return Ok((r.value, r.unit)),
                other => trace!(channel = %self.channel, attempts, ?other, "No valid reading yet"),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(StationError::timeout(
                    format!(
                        "Measurement on channel '{}' ({} attempts)",
                        self.channel, attempts
                    ),
                    elapsed,
                    self.timeout,
                ));
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval.min(self.timeout - elapsed)) => {}
                _ = token.cancelled() => {}
            }
        }
    }
}
