//! # station-core
//!
//! Shared vocabulary for the assembly station workspace: poses and axes,
//! device identity, the typed error, hardware capability traits and the
//! cancellable/pausable command model.
//!
//! Higher layers (`station-hardware`, `station-motion`, `station-scan`) depend
//! on this crate and never on each other's drivers.

pub mod cancel;
pub mod capabilities;
pub mod command;
pub mod device;
pub mod error;
pub mod limits;
pub mod position;
pub mod timing;

pub use cancel::CancelToken;
pub use capabilities::{
    ChannelReading, DeviceMovement, DigitalIo, ImageCapture, MeasurementSource, PinDirection,
    PinStateChange,
};
pub use command::{
    Command, CommandContext, CommandError, CommandHandle, CommandResult, CommandSequence,
    CommandStatus, DelayCommand,
};
pub use device::{DeviceId, DeviceKind, HexapodLocation, ResourceGroup};
pub use error::{ErrorKind, StationError, StationResult};
pub use position::{Axis, Position};
