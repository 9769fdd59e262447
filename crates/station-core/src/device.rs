//! Device identity
//!
//! Positioning devices are modelled as a tagged enum instead of string
//! identifiers. The textual form (`"hex-left"`, `"gantry"`) only exists at the
//! configuration and logging boundary.

use crate::error::StationError;
use crate::position::Axis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mounting location of a hexapod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HexapodLocation {
    /// Left-hand hexapod
    Left,
    /// Right-hand hexapod
    Right,
    /// Bottom hexapod
    Bottom,
}

impl HexapodLocation {
    fn as_str(self) -> &'static str {
        match self {
            HexapodLocation::Left => "left",
            HexapodLocation::Right => "right",
            HexapodLocation::Bottom => "bottom",
        }
    }
}

/// Broad family of a positioning device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// 6-DOF parallel kinematic stage
    Hexapod,
    /// 3-axis linear stage
    Gantry,
}

/// Devices that share a physical envelope and must not move at the same time.
///
/// Every hexapod belongs to [`ResourceGroup::HexapodEnvelope`]; new hexapod
/// locations join it through [`DeviceId::resource_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceGroup {
    /// Shared working volume of all hexapods
    HexapodEnvelope,
}

/// Identifier of a positioning device on the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceId {
    /// A hexapod at the given location
    Hexapod(HexapodLocation),
    /// The gantry
    Gantry,
}

impl DeviceId {
    /// Device family.
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceId::Hexapod(_) => DeviceKind::Hexapod,
            DeviceId::Gantry => DeviceKind::Gantry,
        }
    }

    /// Axes this device can drive.
    pub fn axes(&self) -> &'static [Axis] {
        match self {
            DeviceId::Hexapod(_) => &Axis::ALL,
            DeviceId::Gantry => &Axis::TRANSLATIONAL,
        }
    }

    /// True for devices with rotary axes (distance checks use translation only).
    pub fn uses_rotary_axes(&self) -> bool {
        matches!(self, DeviceId::Hexapod(_))
    }

    /// True if this device can drive `axis`.
    pub fn supports_axis(&self, axis: Axis) -> bool {
        self.axes().contains(&axis)
    }

    /// Shared resource group this device must lock before moving, if any.
    pub fn resource_group(&self) -> Option<ResourceGroup> {
        match self {
            DeviceId::Hexapod(_) => Some(ResourceGroup::HexapodEnvelope),
            DeviceId::Gantry => None,
        }
    }

    /// Canonical textual form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceId::Hexapod(HexapodLocation::Left) => "hex-left",
            DeviceId::Hexapod(HexapodLocation::Right) => "hex-right",
            DeviceId::Hexapod(HexapodLocation::Bottom) => "hex-bottom",
            DeviceId::Gantry => "gantry",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceId {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "gantry" {
            return Ok(DeviceId::Gantry);
        }
        let location = normalized
            .strip_prefix("hex-")
            .or_else(|| normalized.strip_prefix("hexapod-"))
            .ok_or_else(|| StationError::DeviceNotConfigured(s.to_string()))?;
        [
            HexapodLocation::Left,
            HexapodLocation::Right,
            HexapodLocation::Bottom,
        ]
        .into_iter()
        .find(|loc| loc.as_str() == location)
        .map(DeviceId::Hexapod)
        .ok_or_else(|| StationError::DeviceNotConfigured(s.to_string()))
    }
}

impl TryFrom<String> for DeviceId {
    type Error = StationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        for id in [
            DeviceId::Hexapod(HexapodLocation::Left),
            DeviceId::Hexapod(HexapodLocation::Right),
            DeviceId::Hexapod(HexapodLocation::Bottom),
            DeviceId::Gantry,
        ] {
            assert_eq!(id.to_string().parse::<DeviceId>().unwrap(), id);
        }
        assert_eq!(
            "Hexapod-Left".parse::<DeviceId>().unwrap(),
            DeviceId::Hexapod(HexapodLocation::Left)
        );
        assert!("hex-top".parse::<DeviceId>().is_err());
        assert!("camera".parse::<DeviceId>().is_err());
    }

    #[test]
    fn test_all_hexapods_share_one_group() {
        let left = DeviceId::Hexapod(HexapodLocation::Left).resource_group();
        let bottom = DeviceId::Hexapod(HexapodLocation::Bottom).resource_group();
        assert_eq!(left, bottom);
        assert!(left.is_some());
        assert_eq!(DeviceId::Gantry.resource_group(), None);
    }

    #[test]
    fn test_gantry_axes() {
        assert!(DeviceId::Gantry.supports_axis(Axis::Z));
        assert!(!DeviceId::Gantry.supports_axis(Axis::U));
        assert!(!DeviceId::Gantry.uses_rotary_axes());
    }

    #[test]
    fn test_serde_as_string_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(DeviceId::Gantry, 1);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"gantry":1}"#);
        let back: std::collections::BTreeMap<DeviceId, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&DeviceId::Gantry), Some(&1));
    }
}
