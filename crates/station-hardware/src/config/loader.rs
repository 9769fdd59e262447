//! Configuration loading for the station.
//!
//! Configuration is layered with Figment:
//! 1. Base layer: `StationConfig::default()`
//! 2. File layer: the TOML file
//! 3. Environment layer: variables prefixed with `STATION_`, nested fields
//!    separated by double underscores
//!
//! ```text
//! STATION_LOGGING__LEVEL=debug
//! STATION_STORAGE__ROOT=/data/scans
//! STATION_SCANNING__SETTLE_TIME=20ms
//! ```

use super::schema::StationConfig;
use super::validation::validate_station_config;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde_valid::Validate;
use std::path::Path;
use tracing::{debug, info};

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "STATION_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Parse error (invalid TOML or wrong types)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Schema validation error
    #[error("Schema validation failed:\n{0}")]
    SchemaValidationError(String),

    /// Cross-field validation error
    #[error("Config validation failed:\n{0}")]
    ValidationError(String),
}

/// Load the station configuration from a TOML file with environment overrides.
pub fn load_station_config(path: &Path) -> Result<StationConfig, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()));
    }

    debug!("Loading station config from: {}", path.display());

    let figment = Figment::from(Serialized::defaults(StationConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config = finish(figment)?;

    info!(
        station = %config.station.name,
        devices = config.devices.len(),
        slides = config.slides.len(),
        "Loaded station config from {}",
        path.display()
    );

    Ok(config)
}

/// Load the station configuration from a TOML string.
///
/// Environment overrides are not applied. Useful for tests and embedded
/// configurations.
pub fn load_station_config_from_str(toml_content: &str) -> Result<StationConfig, ConfigLoadError> {
    let figment = Figment::from(Serialized::defaults(StationConfig::default()))
        .merge(Toml::string(toml_content));
    finish(figment)
}

fn finish(figment: Figment) -> Result<StationConfig, ConfigLoadError> {
    let config: StationConfig = figment
        .extract()
        .map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;

    if let Err(errors) = config.validate() {
        let error_messages: Vec<String> =
            errors.to_string().lines().map(|s| s.to_string()).collect();
        return Err(ConfigLoadError::SchemaValidationError(
            error_messages.join("\n"),
        ));
    }

    if let Err(errors) = validate_station_config(&config) {
        let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(ConfigLoadError::ValidationError(error_messages.join("\n")));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use station_core::{Axis, DeviceId, HexapodLocation};
    use std::io::Write;
    use std::time::Duration;

    const STATION: &str = r#"
[station]
name = "bonding-cell-2"

[devices.hex-left]
positions = [
    { name = "Home", position = { x = 0.0, y = 0.0, z = 0.0 } },
    { name = "Approach", position = { x = 1.0, y = 0.0, z = 5.0, u = 0.5 } },
    { name = "Bond", position = { x = 1.0, y = 0.0, z = 6.0 } },
]
edges = [
    { from = "Home", to = "Approach", weight = 2.0 },
    { from = "Approach", to = "Bond" },
]

[devices.gantry]
positions = [{ name = "Home", position = { x = 0.0, y = 0.0, z = 0.0 } }]

[io.pins.slide_valve]
device = "io-main"
pin = "DO1"
direction = "output"

[io.pins.slide_up]
device = "io-main"
pin = "DI1"
direction = "input"

[io.pins.slide_down]
device = "io-main"
pin = "DI2"
direction = "input"

[slides.dispenser]
output = "slide_valve"
up_sensor = "slide_up"
down_sensor = "slide_down"
timeout = "5s"

[scanning]
axes = ["X", "Y"]
step_sizes = [0.02, 0.005]
settle_time = "20ms"
"#;

    #[test]
    fn test_load_full_config() {
        let config = load_station_config_from_str(STATION).unwrap();
        assert_eq!(config.station.name, "bonding-cell-2");

        let left = &config.devices[&DeviceId::Hexapod(HexapodLocation::Left)];
        assert_eq!(left.positions.len(), 3);
        assert_eq!(left.positions[1].name, "Approach");
        assert_eq!(left.positions[1].position.u, 0.5);
        assert_eq!(left.edges[1].weight, 1.0);

        let slide = &config.slides["dispenser"];
        assert!(slide.active_high);
        assert_eq!(slide.timeout, Duration::from_secs(5));

        assert_eq!(config.scanning.axes, vec![Axis::X, Axis::Y]);
        assert_eq!(config.scanning.settle_time, Duration::from_millis(20));
        // untouched fields keep their defaults
        assert_eq!(config.scanning.consecutive_decreases_limit, 3);
        assert_eq!(config.scanning.significant_decrease_threshold, 0.05);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_station_config_from_str("").unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.motion.input_wait_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_edge_to_unknown_position_rejected() {
        let toml = r#"
[devices.gantry]
positions = [{ name = "Home", position = { x = 0.0 } }]
edges = [{ from = "Home", to = "Nowhere" }]
"#;
        let err = load_station_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::ValidationError(_)));
        assert!(err.to_string().contains("Nowhere"));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let toml = r#"
[devices.gantry]
positions = [
    { name = "A", position = { x = 0.0 } },
    { name = "B", position = { x = 1.0 } },
]
edges = [{ from = "A", to = "B", weight = -1.0 }]
"#;
        assert!(load_station_config_from_str(toml).is_err());
    }

    #[test]
    fn test_slide_with_wrong_pin_direction_rejected() {
        let toml = r#"
[io.pins.valve]
device = "io"
pin = "DI0"
direction = "input"

[io.pins.up]
device = "io"
pin = "DI1"
direction = "input"

[slides.s1]
output = "valve"
up_sensor = "up"
down_sensor = "missing"
"#;
        let err = load_station_config_from_str(toml).unwrap_err().to_string();
        assert!(err.contains("valve"));
        assert!(err.contains("missing"));
    }

    #[test]
    fn test_step_larger_than_max_rejected() {
        let toml = r#"
[scanning]
step_sizes = [0.2]
max_step_size = 0.1
"#;
        let err = load_station_config_from_str(toml).unwrap_err();
        assert!(err.to_string().contains("step size"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let toml = r#"
[scanning]
improvement_threshold = 1.5
"#;
        let err = load_station_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::SchemaValidationError(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = load_station_config_from_str("[station]\nname = \"x\"\ncolour = \"red\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::ParseError(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_station_config(Path::new("/nonexistent/station.toml")).unwrap_err();
        assert!(matches!(err, ConfigLoadError::NotFound(_)));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STATION.as_bytes()).unwrap();

        std::env::set_var("STATION_LOGGING__LEVEL", "debug");
        std::env::set_var("STATION_STORAGE__ROOT", "/tmp/station-scans");
        let result = load_station_config(file.path());
        std::env::remove_var("STATION_LOGGING__LEVEL");
        std::env::remove_var("STATION_STORAGE__ROOT");

        let config = result.unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.storage.root,
            std::path::PathBuf::from("/tmp/station-scans")
        );
        assert_eq!(config.station.name, "bonding-cell-2");
    }
}
