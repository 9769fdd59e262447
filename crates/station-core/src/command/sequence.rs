//! Ordered composition of commands.

use super::{Command, CommandContext, CommandHandle, CommandResult, CommandStatus};
use crate::error::{ErrorKind, StationError, StationResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Write as _;
use tracing::{debug, info};

/// Runs its steps in order under one cancellation and pause scope.
///
/// Stops at the first step that does not succeed and fails with
/// [`StationError::StepFailed`] naming that step. Completed steps are not
/// rolled back.
pub struct CommandSequence {
    name: String,
    description: String,
    steps: Vec<CommandHandle>,
    current: Mutex<Option<usize>>,
    results: Mutex<Vec<CommandResult>>,
}

impl CommandSequence {
    /// Empty sequence.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            steps: Vec::new(),
            current: Mutex::new(None),
            results: Mutex::new(Vec::new()),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a step (builder form).
    #[must_use]
    pub fn then(mut self, command: impl Command + 'static) -> Self {
        self.push(command);
        self
    }

    /// Append a step.
    pub fn push(&mut self, command: impl Command + 'static) {
        self.steps.push(CommandHandle::new(command));
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the sequence has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Zero-based index of the step currently (or last) executing.
    pub fn current_index(&self) -> Option<usize> {
        *self.current.lock()
    }

    /// Name of the step currently (or last) executing.
    pub fn current_command(&self) -> Option<String> {
        self.current_step().map(|step| step.name().to_string())
    }

    /// Results of the steps that have finished so far.
    pub fn step_results(&self) -> Vec<CommandResult> {
        self.results.lock().clone()
    }

    fn current_step(&self) -> Option<&CommandHandle> {
        self.current_index().and_then(|i| self.steps.get(i))
    }
}

#[async_trait]
impl Command for CommandSequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    async fn run(&self, ctx: &CommandContext) -> StationResult<String> {
        let mut summary = String::new();
        let mut total = std::time::Duration::ZERO;

        for (index, step) in self.steps.iter().enumerate() {
            ctx.checkpoint().await?;
            *self.current.lock() = Some(index);
            debug!(sequence = %self.name, step = index + 1, command = %step.name(), "Starting step");

            let result = step.execute_in(ctx).await;
            self.results.lock().push(result.clone());

            if !result.success {
                return Err(StationError::StepFailed {
                    index: index + 1,
                    name: step.name().to_string(),
                    message: result.message.clone(),
                    kind: result.error_kind().unwrap_or(ErrorKind::Internal),
                });
            }

            total += result.execution_time;
            if !summary.is_empty() {
                summary.push_str(", ");
            }
            let _ = write!(
                summary,
                "{}: {:.3}s",
                step.name(),
                result.execution_time.as_secs_f64()
            );
        }

        info!(sequence = %self.name, steps = self.steps.len(), "Sequence completed");
        Ok(format!(
            "Completed {} steps in {:.3}s ({})",
            self.steps.len(),
            total.as_secs_f64(),
            summary
        ))
    }

    async fn on_pause(&self) {
        if let Some(step) = self.current_step() {
            if step.status() == CommandStatus::Running {
                let _ = step.pause().await;
            }
        }
    }

    async fn on_resume(&self) {
        if let Some(step) = self.current_step() {
            if step.status() == CommandStatus::Paused {
                let _ = step.resume().await;
            }
        }
    }

    async fn on_abort(&self) {
        if let Some(step) = self.current_step() {
            if step.status().is_active() {
                let _ = step.abort().await;
            }
        }
    }
}
