//! Peak search as a [`Command`].

use crate::algorithm::PeakSearch;
use crate::record::ScanOutcome;
use async_trait::async_trait;
use parking_lot::Mutex;
use station_core::{Command, CommandContext, StationResult};
use std::sync::Arc;

/// Runs one scan session per execution and keeps its outcome.
#[derive(Debug)]
pub struct ScanCommand {
    name: String,
    search: Arc<PeakSearch>,
    outcome: Mutex<Option<ScanOutcome>>,
}

impl ScanCommand {
    /// Command running `search`.
    pub fn new(search: Arc<PeakSearch>) -> Self {
        Self {
            name: format!("Scan {}", search.device()),
            search,
            outcome: Mutex::new(None),
        }
    }

    /// Outcome of the last completed session.
    pub fn outcome(&self) -> Option<ScanOutcome> {
        self.outcome.lock().clone()
    }
}

#[async_trait]
impl Command for ScanCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        let params = self.search.parameters();
        format!(
            "{} on '{}' over {} axes with {} step sizes",
            self.name,
            params.channel,
            params.axes.len(),
            params.step_sizes.len()
        )
    }

    async fn run(&self, ctx: &CommandContext) -> StationResult<String> {
        let outcome = self.search.run(ctx).await?;
        let message = format!(
            "Peak {:.6} at {} (baseline {:.6}, {} measurements)",
            outcome.peak.value,
            outcome.peak.position,
            outcome.baseline.value,
            outcome.statistics.count
        );
        *self.outcome.lock() = Some(outcome);
        Ok(message)
    }
}
