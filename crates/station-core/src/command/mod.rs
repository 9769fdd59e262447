//! Cancellable, pausable units of work.
//!
//! # Key Concepts
//!
//! - **Command**: the body of an operation. Implementors only write
//!   [`Command::run`] and call [`CommandContext::checkpoint`] between
//!   interruptible stages.
//! - **CommandHandle**: owns the lifecycle of one command execution
//!   (status, pause flag, cancellation, result). Cloning a handle gives
//!   another view onto the same execution, so one task can `execute` while
//!   another calls `pause`/`resume`/`abort`.
//! - **CommandSequence**: an ordered list of handles executed as one command.
//!
//! # Lifecycle
//!
//! ```text
//!   NotStarted ──execute──▶ Running ──▶ Completed | Failed | Aborted
//!                             ▲  │
//!                       resume│  │pause
//!                             │  ▼
//!                            Paused ──abort──▶ Aborted
//! ```
//!
//! `execute` never unwinds: body errors and panics both become a failed
//! [`CommandResult`].

mod delay;
mod sequence;

pub use delay::DelayCommand;
pub use sequence::CommandSequence;

use crate::cancel::CancelToken;
use crate::error::{ErrorKind, StationError, StationResult};
use crate::limits::PAUSE_POLL_INTERVAL;
use crate::timing::{cancellable_sleep, precise_sleep};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// =============================================================================
// Status & Result
// =============================================================================

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Created but not yet executed
    NotStarted,
    /// Body is running
    Running,
    /// Body is suspended at a checkpoint
    Paused,
    /// Body returned successfully
    Completed,
    /// Body returned an error or panicked
    Failed,
    /// Aborted or cancelled
    Aborted,
}

impl CommandStatus {
    /// True for Completed, Failed and Aborted.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Aborted
        )
    }

    /// True for Running and Paused.
    pub fn is_active(self) -> bool {
        matches!(self, CommandStatus::Running | CommandStatus::Paused)
    }
}

/// Error captured in a [`CommandResult`].
///
/// Keeps the rendered [`StationError`] text along with its classification so
/// results stay cheap to clone and log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    /// Classification of the original error
    pub kind: ErrorKind,
    /// Rendered error message
    pub message: String,
}

impl From<&StationError> for CommandError {
    fn from(err: &StationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one command execution. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    /// True if the body completed successfully
    pub success: bool,
    /// Success summary or failure description
    pub message: String,
    /// Error details on failure
    pub error: Option<CommandError>,
    /// Wall-clock duration of the execution
    pub execution_time: Duration,
}

impl CommandResult {
    /// Successful result.
    pub fn success(message: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            execution_time,
        }
    }

    /// Failed result carrying `err`.
    pub fn failure(err: &StationError, execution_time: Duration) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error: Some(CommandError::from(err)),
            execution_time,
        }
    }

    /// Result of an aborted or cancelled execution.
    pub fn aborted(message: impl Into<String>, execution_time: Duration) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(CommandError {
                kind: ErrorKind::Cancellation,
                message: message.clone(),
            }),
            message,
            execution_time,
        }
    }

    /// Classification of the failure, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// True if the execution ended because of abort or cancellation.
    pub fn was_aborted(&self) -> bool {
        self.error_kind() == Some(ErrorKind::Cancellation)
    }
}

// =============================================================================
// Command Trait
// =============================================================================

/// Body of a cancellable, pausable operation.
///
/// Bodies call [`CommandContext::checkpoint`] wherever suspension or
/// cancellation is acceptable. Lifecycle bookkeeping lives in
/// [`CommandHandle`].
#[async_trait]
pub trait Command: Send + Sync {
    /// Short name used in logs and sequence reports.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> String {
        self.name().to_string()
    }

    /// Run the body. The returned string becomes the success message.
    async fn run(&self, ctx: &CommandContext) -> StationResult<String>;

    /// Called after the command enters Paused.
    async fn on_pause(&self) {}

    /// Called after the command leaves Paused.
    async fn on_resume(&self) {}

    /// Called after abort has been requested.
    async fn on_abort(&self) {}
}

// =============================================================================
// Command Context
// =============================================================================

/// Cancellation and pause scope handed to [`Command::run`].
#[derive(Clone)]
pub struct CommandContext {
    token: CancelToken,
    paused: Arc<AtomicBool>,
    outer_paused: Vec<Arc<AtomicBool>>,
}

impl CommandContext {
    /// Context that can only be cancelled through `token`.
    pub fn detached(token: CancelToken) -> Self {
        Self {
            token,
            paused: Arc::new(AtomicBool::new(false)),
            outer_paused: Vec::new(),
        }
    }

    /// Cancellation token for this execution.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True if this command or any enclosing command is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
            || self.outer_paused.iter().any(|p| p.load(Ordering::SeqCst))
    }

    /// Pause/cancel gate.
    ///
    /// Returns `Err(Cancelled)` if cancelled. While paused, re-checks every
    /// [`PAUSE_POLL_INTERVAL`]; cancellation wakes it immediately.
    pub async fn checkpoint(&self) -> StationResult<()> {
        loop {
            if self.token.is_cancelled() {
                return Err(StationError::Cancelled("command aborted".into()));
            }
            if !self.is_paused() {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(PAUSE_POLL_INTERVAL) => {}
                _ = self.token.cancelled() => {}
            }
        }
    }

    /// Checkpoint, then a cancellable delay.
    pub async fn sleep(&self, duration: Duration) -> StationResult<()> {
        self.checkpoint().await?;
        cancellable_sleep(duration, &self.token).await
    }

    /// Checkpoint, then a precise cancellable delay.
    pub async fn precise_sleep(&self, duration: Duration) -> StationResult<()> {
        self.checkpoint().await?;
        precise_sleep(duration, &self.token).await
    }

    fn nested(&self, token: CancelToken, paused: Arc<AtomicBool>) -> Self {
        let mut outer_paused = self.outer_paused.clone();
        outer_paused.push(Arc::clone(&self.paused));
        Self {
            token,
            paused,
            outer_paused,
        }
    }
}

// =============================================================================
// Command Handle
// =============================================================================

struct Control {
    status: Mutex<CommandStatus>,
    paused: Arc<AtomicBool>,
    abort_requested: AtomicBool,
    run_token: Mutex<Option<CancelToken>>,
    result: Mutex<Option<CommandResult>>,
}

/// Lifecycle owner for one execution of a [`Command`].
#[derive(Clone)]
pub struct CommandHandle {
    command: Arc<dyn Command>,
    control: Arc<Control>,
}

impl std::fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("name", &self.command.name())
            .field("status", &self.status())
            .finish()
    }
}

impl CommandHandle {
    /// Wrap a command in a fresh NotStarted handle.
    pub fn new(command: impl Command + 'static) -> Self {
        Self::from_arc(Arc::new(command))
    }

    /// Wrap a shared command in a fresh NotStarted handle.
    pub fn from_arc(command: Arc<dyn Command>) -> Self {
        Self {
            command,
            control: Arc::new(Control {
                status: Mutex::new(CommandStatus::NotStarted),
                paused: Arc::new(AtomicBool::new(false)),
                abort_requested: AtomicBool::new(false),
                run_token: Mutex::new(None),
                result: Mutex::new(None),
            }),
        }
    }

    /// Command name.
    pub fn name(&self) -> &str {
        self.command.name()
    }

    /// Command description.
    pub fn description(&self) -> String {
        self.command.description()
    }

    /// Current status.
    pub fn status(&self) -> CommandStatus {
        *self.control.status.lock()
    }

    /// Result, once the execution has finished.
    pub fn result(&self) -> Option<CommandResult> {
        self.control.result.lock().clone()
    }

    /// Execute the command under `cancel`.
    pub async fn execute(&self, cancel: &CancelToken) -> CommandResult {
        let token = cancel.child_token();
        let ctx = CommandContext {
            token: token.clone(),
            paused: Arc::clone(&self.control.paused),
            outer_paused: Vec::new(),
        };
        self.execute_with(ctx).await
    }

    /// Execute as a child of `parent`: cancelled with the parent and held at
    /// checkpoints while the parent is paused.
    pub async fn execute_in(&self, parent: &CommandContext) -> CommandResult {
        let ctx = parent.nested(
            parent.token().child_token(),
            Arc::clone(&self.control.paused),
        );
        self.execute_with(ctx).await
    }

    async fn execute_with(&self, ctx: CommandContext) -> CommandResult {
        let name = self.command.name().to_string();
        {
            let mut status = self.control.status.lock();
            if *status != CommandStatus::NotStarted {
                let err = StationError::InvalidState(format!(
                    "Command '{}' cannot execute from state {:?}",
                    name, *status
                ));
                return CommandResult::failure(&err, Duration::ZERO);
            }
            *status = CommandStatus::Running;
        }
        *self.control.run_token.lock() = Some(ctx.token.clone());

        debug!(command = %name, "Command started");
        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.command.run(&ctx))
            .catch_unwind()
            .await;
        let elapsed = start.elapsed();

        let aborted = self.control.abort_requested.load(Ordering::SeqCst);
        let (status, result) = match outcome {
            Ok(Ok(message)) if !aborted => {
                (CommandStatus::Completed, CommandResult::success(message, elapsed))
            }
            Ok(Ok(_)) => (
                CommandStatus::Aborted,
                CommandResult::aborted(format!("Command '{}' aborted", name), elapsed),
            ),
            Ok(Err(err)) if aborted || err.is_cancelled() => (
                CommandStatus::Aborted,
                CommandResult::aborted(err.to_string(), elapsed),
            ),
            Ok(Err(err)) => (CommandStatus::Failed, CommandResult::failure(&err, elapsed)),
            Err(panic) => {
                let err = StationError::Internal(format!(
                    "Command '{}' panicked: {}",
                    name,
                    panic_message(panic.as_ref())
                ));
                (CommandStatus::Failed, CommandResult::failure(&err, elapsed))
            }
        };

        match status {
            CommandStatus::Completed => {
                info!(command = %name, elapsed_ms = elapsed.as_millis() as u64, "Command completed")
            }
            CommandStatus::Aborted => {
                info!(command = %name, elapsed_ms = elapsed.as_millis() as u64, "Command aborted")
            }
            _ => {
                warn!(command = %name, error = %result.message, "Command failed")
            }
        }

        self.control.paused.store(false, Ordering::SeqCst);
        *self.control.result.lock() = Some(result.clone());
        *self.control.status.lock() = status;
        *self.control.run_token.lock() = None;
        result
    }

    /// Request a cooperative stop. Valid from Running or Paused.
    pub async fn abort(&self) -> StationResult<()> {
        {
            let mut status = self.control.status.lock();
            if !status.is_active() {
                return Err(StationError::InvalidState(format!(
                    "Cannot abort '{}' from state {:?}",
                    self.command.name(),
                    *status
                )));
            }
            *status = CommandStatus::Aborted;
            self.control.abort_requested.store(true, Ordering::SeqCst);
            self.control.paused.store(false, Ordering::SeqCst);
        }
        if let Some(token) = self.control.run_token.lock().as_ref() {
            token.cancel();
        }
        self.command.on_abort().await;
        Ok(())
    }

    /// Suspend at the next checkpoint. Valid from Running.
    pub async fn pause(&self) -> StationResult<()> {
        {
            let mut status = self.control.status.lock();
            if *status != CommandStatus::Running {
                return Err(StationError::InvalidState(format!(
                    "Cannot pause '{}' from state {:?}",
                    self.command.name(),
                    *status
                )));
            }
            *status = CommandStatus::Paused;
            self.control.paused.store(true, Ordering::SeqCst);
        }
        self.command.on_pause().await;
        Ok(())
    }

    /// Leave Paused. Valid from Paused.
    pub async fn resume(&self) -> StationResult<()> {
        {
            let mut status = self.control.status.lock();
            if *status != CommandStatus::Paused {
                return Err(StationError::InvalidState(format!(
                    "Cannot resume '{}' from state {:?}",
                    self.command.name(),
                    *status
                )));
            }
            *status = CommandStatus::Running;
            self.control.paused.store(false, Ordering::SeqCst);
        }
        self.command.on_resume().await;
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
