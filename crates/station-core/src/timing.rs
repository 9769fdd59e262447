//! Cancellable delays.

use crate::cancel::CancelToken;
use crate::error::{StationError, StationResult};
use crate::limits::PRECISE_SPIN_WINDOW;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

/// Sleep for `duration` unless `token` is cancelled first.
pub async fn cancellable_sleep(duration: Duration, token: &CancelToken) -> StationResult<()> {
    if token.is_cancelled() {
        return Err(StationError::Cancelled("delay interrupted".into()));
    }
    tokio::select! {
        _ = sleep(duration) => Ok(()),
        _ = token.cancelled() => Err(StationError::Cancelled("delay interrupted".into())),
    }
}

/// Delay with sub-millisecond accuracy.
///
/// Sleeps until [`PRECISE_SPIN_WINDOW`] before the deadline, then yields to the
/// scheduler in a loop until the deadline passes.
pub async fn precise_sleep(duration: Duration, token: &CancelToken) -> StationResult<()> {
    let deadline = Instant::now() + duration;
    if duration > PRECISE_SPIN_WINDOW {
        let coarse = deadline - PRECISE_SPIN_WINDOW;
        tokio::select! {
            _ = sleep_until(coarse) => {}
            _ = token.cancelled() => {
                return Err(StationError::Cancelled("delay interrupted".into()));
            }
        }
    }
    while Instant::now() < deadline {
        if token.is_cancelled() {
            return Err(StationError::Cancelled("delay interrupted".into()));
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}
