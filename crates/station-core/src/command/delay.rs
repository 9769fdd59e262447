use super::{Command, CommandContext};
use crate::error::StationResult;
use crate::limits::PAUSE_POLL_INTERVAL;
use async_trait::async_trait;
use std::time::Duration;

/// Waits a fixed duration with the precise timer.
///
/// The wait is split into chunks no longer than [`PAUSE_POLL_INTERVAL`];
/// time spent paused between chunks does not count toward the delay.
pub struct DelayCommand {
    name: String,
    duration: Duration,
}

impl DelayCommand {
    /// Delay named `name` lasting `duration`.
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }

    /// Configured duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl Command for DelayCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("Wait {:?}", self.duration)
    }

    async fn run(&self, ctx: &CommandContext) -> StationResult<String> {
        let mut remaining = self.duration;
        while !remaining.is_zero() {
            let chunk = remaining.min(PAUSE_POLL_INTERVAL);
            ctx.precise_sleep(chunk).await?;
            remaining -= chunk;
        }
        Ok(format!("Waited {:?}", self.duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::command::{CommandHandle, CommandStatus};
    use std::time::Instant;

    #[tokio::test]
    async fn test_delay_waits_full_duration() {
        let handle = CommandHandle::new(DelayCommand::new("settle", Duration::from_millis(120)));
        let start = Instant::now();
        let result = handle.execute(&CancelToken::new()).await;
        assert!(result.success);
        assert!(start.elapsed() >= Duration::from_millis(120));
        assert_eq!(handle.status(), CommandStatus::Completed);
    }

    #[tokio::test]
    async fn test_delay_cancelled_early() {
        let cancel = CancelToken::new();
        let handle = CommandHandle::new(DelayCommand::new("settle", Duration::from_secs(5)));
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let result = handle.execute(&cancel).await;
        assert!(result.was_aborted());
        assert!(result.execution_time < Duration::from_secs(1));
    }
}
