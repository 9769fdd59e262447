//! Absolute machine poses.
//!
//! A [`Position`] carries six axes `(X, Y, Z, U, V, W)`. Hexapods use all six;
//! gantry-class devices use only the translational axes and keep `U, V, W`
//! at zero.

use crate::error::StationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single machine axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Axis {
    /// Translation X
    X,
    /// Translation Y
    Y,
    /// Translation Z
    Z,
    /// Rotation about X
    U,
    /// Rotation about Y
    V,
    /// Rotation about Z
    W,
}

impl Axis {
    /// All six axes in index order.
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::U, Axis::V, Axis::W];

    /// The translational axes.
    pub const TRANSLATIONAL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of this axis (0 for X through 5 for W).
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::U => 3,
            Axis::V => 4,
            Axis::W => 5,
        }
    }

    /// Axis for an index, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// True for X, Y and Z.
    pub fn is_translational(self) -> bool {
        matches!(self, Axis::X | Axis::Y | Axis::Z)
    }

    /// Single-letter label.
    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::U => "U",
            Axis::V => "V",
            Axis::W => "W",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Axis {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "X" => Ok(Axis::X),
            "Y" => Ok(Axis::Y),
            "Z" => Ok(Axis::Z),
            "U" => Ok(Axis::U),
            "V" => Ok(Axis::V),
            "W" => Ok(Axis::W),
            other => Err(StationError::Configuration(format!(
                "Unknown axis '{}'",
                other
            ))),
        }
    }
}

/// Absolute pose of a device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// X in length units
    pub x: f64,
    /// Y in length units
    pub y: f64,
    /// Z in length units
    pub z: f64,
    /// Rotation about X in degrees
    pub u: f64,
    /// Rotation about Y in degrees
    pub v: f64,
    /// Rotation about Z in degrees
    pub w: f64,
}

impl Position {
    /// The all-zero pose.
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        u: 0.0,
        v: 0.0,
        w: 0.0,
    };

    /// Build a full six-axis pose.
    pub fn new(x: f64, y: f64, z: f64, u: f64, v: f64, w: f64) -> Self {
        Self { x, y, z, u, v, w }
    }

    /// Build a translation-only pose (gantry-class devices).
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::ORIGIN
        }
    }

    /// Value of one axis.
    pub fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::U => self.u,
            Axis::V => self.v,
            Axis::W => self.w,
        }
    }

    /// Copy of this pose with one axis replaced.
    #[must_use]
    pub fn with_axis(mut self, axis: Axis, value: f64) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::U => self.u = value,
            Axis::V => self.v = value,
            Axis::W => self.w = value,
        }
        self
    }

    /// Copy of this pose moved by `delta` along `axis`.
    #[must_use]
    pub fn offset(self, axis: Axis, delta: f64) -> Self {
        let value = self.axis(axis) + delta;
        self.with_axis(axis, value)
    }

    /// Axes as an array in index order.
    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.z, self.u, self.v, self.w]
    }

    /// Pose from an array in index order.
    pub fn from_array(values: [f64; 6]) -> Self {
        let [x, y, z, u, v, w] = values;
        Self { x, y, z, u, v, w }
    }

    /// Euclidean distance over X, Y and Z only.
    pub fn translational_distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Euclidean distance over all six axes.
    pub fn distance(&self, other: &Position) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// True when every axis is a finite number.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(X={:.4}, Y={:.4}, Z={:.4}, U={:.4}, V={:.4}, W={:.4})",
            self.x, self.y, self.z, self.u, self.v, self.w
        )
    }
}
