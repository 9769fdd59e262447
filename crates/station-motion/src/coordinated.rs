//! Coordinated multi-device command model.
//!
//! A [`CoordinatedCommand`] is one action plus its scheduling attributes.
//! Commands sharing an `execution_order` form a group; groups run in
//! ascending order with a barrier between them.

use station_core::DeviceId;
use station_hardware::SlideTarget;
use std::fmt;
use std::time::Duration;

/// The work a coordinated command performs.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatedAction {
    /// Move a device to a named position along the planned path.
    Motion {
        /// Device to move
        device: DeviceId,
        /// Named target position
        target: String,
    },
    /// Set or clear a named output.
    Output {
        /// Logical output name
        pin: String,
        /// Level to drive
        state: bool,
    },
    /// Drive a pneumatic slide.
    SlideMove {
        /// Slide name
        slide: String,
        /// End position
        target: SlideTarget,
    },
    /// Fixed delay.
    Timer {
        /// Delay length
        duration: Duration,
    },
    /// Wait for a named input to reach a level.
    WaitForInput {
        /// Logical input name
        pin: String,
        /// Level to wait for
        expected: bool,
        /// Limit; the executor default applies when `None`
        timeout: Option<Duration>,
    },
    /// Capture an image.
    ImageCapture {
        /// Camera name
        camera: String,
        /// File label
        label: String,
    },
}

impl fmt::Display for CoordinatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatedAction::Motion { device, target } => {
                write!(f, "move {} to {}", device, target)
            }
            CoordinatedAction::Output { pin, state } => {
                write!(f, "{} {}", if *state { "set" } else { "clear" }, pin)
            }
            CoordinatedAction::SlideMove { slide, target } => {
                write!(f, "slide {} {:?}", slide, target)
            }
            CoordinatedAction::Timer { duration } => write!(f, "wait {:?}", duration),
            CoordinatedAction::WaitForInput { pin, expected, .. } => {
                write!(f, "wait for {} == {}", pin, expected)
            }
            CoordinatedAction::ImageCapture { camera, label } => {
                write!(f, "capture {} as {}", camera, label)
            }
        }
    }
}

/// An action with its group and blocking flag.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatedCommand {
    /// What to do
    pub action: CoordinatedAction,
    /// Group key; lower groups run first
    pub execution_order: i32,
    /// Await this command before starting the next member of its group
    pub wait_for_completion: bool,
}

impl CoordinatedCommand {
    fn new(action: CoordinatedAction, execution_order: i32) -> Self {
        Self {
            action,
            execution_order,
            wait_for_completion: false,
        }
    }

    /// Move `device` to the named position `target`.
    pub fn motion(device: DeviceId, target: impl Into<String>, execution_order: i32) -> Self {
        Self::new(
            CoordinatedAction::Motion {
                device,
                target: target.into(),
            },
            execution_order,
        )
    }

    /// Drive a named output.
    pub fn output(pin: impl Into<String>, state: bool, execution_order: i32) -> Self {
        Self::new(
            CoordinatedAction::Output {
                pin: pin.into(),
                state,
            },
            execution_order,
        )
    }

    /// Drive a slide to `target`.
    pub fn slide(slide: impl Into<String>, target: SlideTarget, execution_order: i32) -> Self {
        Self::new(
            CoordinatedAction::SlideMove {
                slide: slide.into(),
                target,
            },
            execution_order,
        )
    }

    /// Fixed delay.
    pub fn timer(duration: Duration, execution_order: i32) -> Self {
        Self::new(CoordinatedAction::Timer { duration }, execution_order)
    }

    /// Wait for a named input.
    pub fn wait_for_input(
        pin: impl Into<String>,
        expected: bool,
        timeout: Option<Duration>,
        execution_order: i32,
    ) -> Self {
        Self::new(
            CoordinatedAction::WaitForInput {
                pin: pin.into(),
                expected,
                timeout,
            },
            execution_order,
        )
    }

    /// Capture an image.
    pub fn image_capture(
        camera: impl Into<String>,
        label: impl Into<String>,
        execution_order: i32,
    ) -> Self {
        Self::new(
            CoordinatedAction::ImageCapture {
                camera: camera.into(),
                label: label.into(),
            },
            execution_order,
        )
    }

    /// Mark as blocking within its group.
    pub fn blocking(mut self) -> Self {
        self.wait_for_completion = true;
        self
    }
}

impl fmt::Display for CoordinatedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.execution_order, self.action)
    }
}

/// Split commands into groups by ascending `execution_order`.
///
/// List order is kept within a group. Returned items are indices into
/// `commands`.
pub fn group_by_order(commands: &[CoordinatedCommand]) -> Vec<(i32, Vec<usize>)> {
    let mut order: Vec<usize> = (0..commands.len()).collect();
    order.sort_by_key(|&i| commands[i].execution_order);

    let mut groups: Vec<(i32, Vec<usize>)> = Vec::new();
    for i in order {
        let key = commands[i].execution_order;
        match groups.last_mut() {
            Some((last, members)) if *last == key => members.push(i),
            _ => groups.push((key, vec![i])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_is_ascending_and_stable() {
        let commands = vec![
            CoordinatedCommand::timer(Duration::ZERO, 2),
            CoordinatedCommand::output("lamp", true, 1),
            CoordinatedCommand::motion(DeviceId::Gantry, "Home", 2),
            CoordinatedCommand::output("lamp", false, -1),
        ];
        let groups = group_by_order(&commands);
        assert_eq!(groups, vec![(-1, vec![3]), (1, vec![1]), (2, vec![0, 2])]);
    }

    #[test]
    fn test_constructors_default_to_non_blocking() {
        let cmd = CoordinatedCommand::slide("dispenser", SlideTarget::Down, 0);
        assert!(!cmd.wait_for_completion);
        assert!(cmd.blocking().wait_for_completion);
    }

    #[test]
    fn test_display() {
        let cmd = CoordinatedCommand::motion(DeviceId::Gantry, "Dispense", 3);
        assert_eq!(cmd.to_string(), "[3] move gantry to Dispense");
    }
}
