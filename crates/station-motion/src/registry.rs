//! Named positions per device.
//!
//! Positions keep their declaration order so that ties during nearest
//! position resolution always pick the one declared first.

use station_core::limits::POSITION_TOLERANCE;
use station_core::{DeviceId, Position};
use station_hardware::StationConfig;
use std::collections::BTreeMap;

/// A position with a human-readable name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPosition {
    /// Position name, unique per device
    pub name: String,
    /// Stored pose
    pub position: Position,
}

/// Where a device currently is relative to its named positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Within tolerance of a named position.
    Known {
        /// Matched position name
        name: String,
        /// Distance to it
        distance: f64,
    },
    /// Not within tolerance of any named position.
    Unknown {
        /// Nearest named position and its distance, if the device has any
        nearest: Option<(String, f64)>,
    },
}

impl Resolution {
    /// Name of the matched position, if known.
    pub fn known_name(&self) -> Option<&str> {
        match self {
            Resolution::Known { name, .. } => Some(name),
            Resolution::Unknown { .. } => None,
        }
    }
}

/// Per-device tables of named positions.
#[derive(Debug, Clone, Default)]
pub struct PositionRegistry {
    devices: BTreeMap<DeviceId, Vec<NamedPosition>>,
}

impl PositionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every configured device and its positions.
    pub fn from_config(config: &StationConfig) -> Self {
        let mut registry = Self::new();
        for (device, device_config) in &config.devices {
            registry.devices.entry(*device).or_default();
            for named in &device_config.positions {
                registry.insert(*device, &named.name, named.position);
            }
        }
        registry
    }

    /// Add or replace a named position. Replacing keeps the original order.
    pub fn insert(&mut self, device: DeviceId, name: &str, position: Position) {
        let positions = self.devices.entry(device).or_default();
        match positions.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.position = position,
            None => positions.push(NamedPosition {
                name: name.to_string(),
                position,
            }),
        }
    }

    /// True if the device has a position table (possibly empty).
    pub fn contains_device(&self, device: DeviceId) -> bool {
        self.devices.contains_key(&device)
    }

    /// Devices with a position table.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.keys().copied()
    }

    /// Named positions of a device in declaration order.
    pub fn positions(&self, device: DeviceId) -> &[NamedPosition] {
        self.devices.get(&device).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up one named position.
    pub fn get(&self, device: DeviceId, name: &str) -> Option<Position> {
        self.positions(device)
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.position)
    }

    /// Distance used to match a pose against named positions.
    ///
    /// Rotary-capable devices compare translation only.
    pub fn match_distance(device: DeviceId, a: &Position, b: &Position) -> f64 {
        if device.uses_rotary_axes() {
            a.translational_distance(b)
        } else {
            a.distance(b)
        }
    }

    /// Match `current` against the device's named positions.
    pub fn resolve(&self, device: DeviceId, current: &Position) -> Resolution {
        let mut nearest: Option<(&NamedPosition, f64)> = None;
        for named in self.positions(device) {
            let distance = Self::match_distance(device, current, &named.position);
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((named, distance));
            }
        }

        match nearest {
            Some((named, distance)) if distance <= POSITION_TOLERANCE => Resolution::Known {
                name: named.name.clone(),
                distance,
            },
            other => Resolution::Unknown {
                nearest: other.map(|(named, distance)| (named.name.clone(), distance)),
            },
        }
    }
}
