//! Peak search on the simulated sample station.

use station_core::{CancelToken, CommandHandle, DeviceId, HexapodLocation};
use station_hardware::drivers::SimulatedStation;
use station_hardware::{load_station_config, StationConfig};
use station_scan::{
    JsonFileStorage, PeakSearch, ScanCommand, ScanProgress, ScanSessionRecord, ScanStatus,
    ScanningParameters,
};
use std::path::PathBuf;
use std::sync::Arc;

const LEFT: DeviceId = DeviceId::Hexapod(HexapodLocation::Left);

fn sample_config() -> StationConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/station.toml");
    load_station_config(&path).unwrap()
}

fn station_at_align(config: &StationConfig) -> SimulatedStation {
    let station = SimulatedStation::from_config(config).unwrap();
    let align = config.devices[&LEFT]
        .positions
        .iter()
        .find(|p| p.name == "Align")
        .unwrap()
        .position;
    station.motion.set_pose(LEFT, align);
    station
}

#[tokio::test]
async fn scan_command_improves_coupling_and_saves_record() {
    let config = sample_config();
    let station = station_at_align(&config);
    let dir = tempfile::tempdir().unwrap();

    let params = ScanningParameters::try_from(config.scanning.clone()).unwrap();
    let search = Arc::new(PeakSearch::new(
        LEFT,
        params,
        station.motion.clone(),
        station.measurement.clone(),
        Arc::new(JsonFileStorage::new(dir.path())),
    ));
    let mut events = search.subscribe();

    let command = Arc::new(ScanCommand::new(search));
    let handle = CommandHandle::from_arc(command.clone());
    let result = handle.execute(&CancelToken::new()).await;
    assert!(result.success, "{}", result.message);

    let outcome = command.outcome().unwrap();
    assert!(outcome.peak.value > outcome.baseline.value);
    assert_eq!(station.pose(LEFT).unwrap(), outcome.final_position);
    assert!(outcome
        .record_path
        .starts_with(dir.path().join("hex-left")));

    let saved: ScanSessionRecord =
        serde_json::from_str(&std::fs::read_to_string(&outcome.record_path).unwrap()).unwrap();
    assert_eq!(saved.status, ScanStatus::Completed);
    assert_eq!(saved.scan_id, outcome.scan_id);
    assert_eq!(saved.peak, outcome.peak);
    assert_eq!(saved.unit, "mW");

    assert!(matches!(events.try_recv(), Ok(ScanProgress::Started { .. })));
}

#[tokio::test]
async fn gantry_rotation_scan_is_rejected() {
    let config = sample_config();
    let station = station_at_align(&config);
    let mut params = ScanningParameters::from(&config.scanning);
    params.axes.push(station_core::Axis::U);

    let search = PeakSearch::new(
        DeviceId::Gantry,
        params,
        station.motion.clone(),
        station.measurement.clone(),
        Arc::new(station_scan::MemoryStorage::new()),
    );
    let handle = CommandHandle::new(ScanCommand::new(Arc::new(search)));
    let result = handle.execute(&CancelToken::new()).await;
    assert!(!result.success);
    assert_eq!(
        result.error_kind(),
        Some(station_core::ErrorKind::Configuration)
    );
}
