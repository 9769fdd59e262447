//! Motion work wrapped as [`Command`]s.
//!
//! Both commands hand their [`CommandContext`] to the executor, so pause,
//! resume and abort reach every coordinated member and the commands can be
//! composed into a [`station_core::CommandSequence`].

use crate::coordinated::CoordinatedCommand;
use crate::executor::{CoordinatedExecutor, ExecutionReport};
use async_trait::async_trait;
use parking_lot::Mutex;
use station_core::{Command, CommandContext, DeviceId, StationResult};
use std::sync::Arc;

/// Move one device to a named position.
#[derive(Debug)]
pub struct MoveToNamedPositionCommand {
    name: String,
    executor: Arc<CoordinatedExecutor>,
    device: DeviceId,
    target: String,
}

impl MoveToNamedPositionCommand {
    /// Command moving `device` to `target`.
    pub fn new(executor: Arc<CoordinatedExecutor>, device: DeviceId, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            name: format!("Move {} to {}", device, target),
            executor,
            device,
            target,
        }
    }
}

#[async_trait]
impl Command for MoveToNamedPositionCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &CommandContext) -> StationResult<String> {
        let commands = [CoordinatedCommand::motion(self.device, self.target.clone(), 0).blocking()];
        let report = self.executor.execute_in(&commands, ctx).await?;
        Ok(format!(
            "{} reached {} ({} moves)",
            self.device, self.target, report.moves_issued
        ))
    }
}

/// A list of coordinated commands run as one command.
#[derive(Debug)]
pub struct CoordinatedSequenceCommand {
    name: String,
    executor: Arc<CoordinatedExecutor>,
    commands: Vec<CoordinatedCommand>,
    report: Mutex<Option<ExecutionReport>>,
}

impl CoordinatedSequenceCommand {
    /// Wrap `commands` under `name`.
    pub fn new(
        name: impl Into<String>,
        executor: Arc<CoordinatedExecutor>,
        commands: Vec<CoordinatedCommand>,
    ) -> Self {
        Self {
            name: name.into(),
            executor,
            commands,
            report: Mutex::new(None),
        }
    }

    /// Report of the last successful run.
    pub fn report(&self) -> Option<ExecutionReport> {
        self.report.lock().clone()
    }
}

#[async_trait]
impl Command for CoordinatedSequenceCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> String {
        format!("{} ({} coordinated commands)", self.name, self.commands.len())
    }

    async fn run(&self, ctx: &CommandContext) -> StationResult<String> {
        let report = self.executor.execute_in(&self.commands, ctx).await?;
        let message = format!(
            "Executed {} commands with {} moves in {:.3}s",
            report.commands_executed,
            report.moves_issued,
            report.elapsed.as_secs_f64()
        );
        *self.report.lock() = Some(report);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MotionGraph;
    use crate::planner::PathPlanner;
    use crate::registry::PositionRegistry;
    use station_core::{CancelToken, CommandHandle, CommandStatus, Position};
    use station_hardware::drivers::{SimulatedIo, SimulatedMotion};
    use station_hardware::IoPinMap;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn executor(latency: Duration) -> (Arc<SimulatedMotion>, Arc<CoordinatedExecutor>) {
        let motion = SimulatedMotion::new(latency);
        motion.add_device(DeviceId::Gantry, Position::ORIGIN);
        let mut registry = PositionRegistry::new();
        let mut graph = MotionGraph::new();
        for (i, name) in ["Home", "A", "B", "C"].iter().enumerate() {
            registry.insert(DeviceId::Gantry, name, Position::translation(i as f64, 0.0, 0.0));
        }
        graph.add_edge("Home", "A", 1.0).unwrap();
        graph.add_edge("A", "B", 1.0).unwrap();
        graph.add_edge("B", "C", 1.0).unwrap();
        let planner = PathPlanner::new(
            registry,
            BTreeMap::from([(DeviceId::Gantry, graph)]),
            motion.clone(),
        );
        let executor =
            CoordinatedExecutor::new(Arc::new(planner), SimulatedIo::new(), IoPinMap::new());
        (motion, Arc::new(executor))
    }

    #[tokio::test]
    async fn test_move_command_reports_moves() {
        let (_, executor) = executor(Duration::ZERO);
        let handle = CommandHandle::new(MoveToNamedPositionCommand::new(
            executor,
            DeviceId::Gantry,
            "B",
        ));
        let result = handle.execute(&CancelToken::new()).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.message, "gantry reached B (2 moves)");
    }

    #[tokio::test]
    async fn test_abort_stops_between_moves() {
        let (motion, executor) = executor(Duration::from_millis(50));
        let handle = CommandHandle::new(MoveToNamedPositionCommand::new(
            executor,
            DeviceId::Gantry,
            "C",
        ));
        let runner = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.execute(&CancelToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(70)).await;
        handle.abort().await.unwrap();

        let result = runner.await.unwrap();
        assert!(result.was_aborted());
        assert_eq!(handle.status(), CommandStatus::Aborted);
        assert!(motion.moves_of(DeviceId::Gantry).len() < 3);
    }

    #[tokio::test]
    async fn test_sequence_command_keeps_report() {
        let (_, executor) = executor(Duration::ZERO);
        let command = Arc::new(CoordinatedSequenceCommand::new(
            "park",
            executor,
            vec![
                CoordinatedCommand::motion(DeviceId::Gantry, "C", 0),
                CoordinatedCommand::timer(Duration::from_millis(5), 1),
                CoordinatedCommand::motion(DeviceId::Gantry, "Home", 2),
            ],
        ));
        let handle = CommandHandle::from_arc(command.clone());
        let result = handle.execute(&CancelToken::new()).await;
        assert!(result.success, "{}", result.message);

        let report = command.report().unwrap();
        assert_eq!(report.commands_executed, 3);
        assert_eq!(report.moves_issued, 6);
        assert_eq!(command.description(), "park (3 coordinated commands)");
    }
}
