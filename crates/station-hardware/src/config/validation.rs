//! Custom validation for the station configuration.
//!
//! Field-level rules live on the schema as `serde_valid` attributes; this
//! module adds the checks that need to look across sections:
//! - Edge endpoints must be named positions of the same device
//! - Position names must be unique per device
//! - Slide pins must exist in the pin map with the right direction
//! - Step sizes must fall in `(0, max_step_size]`

use super::schema::StationConfig;
use serde_valid::validation::Error as ValidationError;
use serde_valid::Validate;
use station_core::PinDirection;
use std::collections::HashSet;

/// Validate that a name is non-empty and has no surrounding whitespace.
pub fn validate_name(name: &String) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Custom("name must not be empty".to_string()));
    }
    if name.trim() != name {
        return Err(ValidationError::Custom(format!(
            "name '{}' has leading or trailing whitespace",
            name
        )));
    }
    Ok(())
}

/// Validate a station configuration completely.
///
/// This performs cross-field validation beyond what serde_valid provides
/// per-field, and runs the per-field rules of map entries.
pub fn validate_station_config(config: &StationConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (device, device_config) in &config.devices {
        if let Err(e) = device_config.validate() {
            errors.push(ValidationError::Custom(format!("Device '{}': {}", device, e)));
        }

        let mut names = HashSet::new();
        for named in &device_config.positions {
            if !names.insert(named.name.as_str()) {
                errors.push(ValidationError::Custom(format!(
                    "Device '{}': duplicate position name '{}'",
                    device, named.name
                )));
            }
            if !named.position.is_finite() {
                errors.push(ValidationError::Custom(format!(
                    "Device '{}': position '{}' has a non-finite axis",
                    device, named.name
                )));
            }
            if !device.uses_rotary_axes() {
                let p = named.position;
                if p.u != 0.0 || p.v != 0.0 || p.w != 0.0 {
                    errors.push(ValidationError::Custom(format!(
                        "Device '{}': position '{}' sets rotary axes the device does not have",
                        device, named.name
                    )));
                }
            }
        }

        for edge in &device_config.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !names.contains(endpoint.as_str()) {
                    errors.push(ValidationError::Custom(format!(
                        "Device '{}': edge {} -> {} references unknown position '{}'",
                        device, edge.from, edge.to, endpoint
                    )));
                }
            }
            if !edge.weight.is_finite() || edge.weight < 0.0 {
                errors.push(ValidationError::Custom(format!(
                    "Device '{}': edge {} -> {} has invalid weight {}",
                    device, edge.from, edge.to, edge.weight
                )));
            }
        }
    }

    for (name, pin) in &config.io.pins {
        if let Err(e) = pin.validate() {
            errors.push(ValidationError::Custom(format!("Pin '{}': {}", name, e)));
        }
    }

    for (name, slide) in &config.slides {
        if let Err(e) = slide.validate() {
            errors.push(ValidationError::Custom(format!("Slide '{}': {}", name, e)));
        }
        let expected = [
            (&slide.output, PinDirection::Output),
            (&slide.up_sensor, PinDirection::Input),
            (&slide.down_sensor, PinDirection::Input),
        ];
        for (pin_name, direction) in expected {
            match config.io.pins.get(pin_name) {
                None => errors.push(ValidationError::Custom(format!(
                    "Slide '{}': pin '{}' is not in the pin map",
                    name, pin_name
                ))),
                Some(pin) if pin.direction != direction => {
                    errors.push(ValidationError::Custom(format!(
                        "Slide '{}': pin '{}' must be an {:?} pin",
                        name, pin_name, direction
                    )))
                }
                Some(_) => {}
            }
        }
    }

    let scanning = &config.scanning;
    for step in &scanning.step_sizes {
        if !(*step > 0.0 && *step <= scanning.max_step_size) {
            errors.push(ValidationError::Custom(format!(
                "Scanning: step size {} must be in (0, {}]",
                step, scanning.max_step_size
            )));
        }
    }

    if !config.devices.is_empty() && !config.devices.contains_key(&config.simulation.coupling_device)
    {
        errors.push(ValidationError::Custom(format!(
            "Simulation: coupling device '{}' is not configured",
            config.simulation.coupling_device
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
