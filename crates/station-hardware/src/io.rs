//! Digital I/O pin map and pin-state cache.
//!
//! Commands refer to pins by logical name (`"dispense_valve"`). The
//! [`IoPinMap`] owned by each station instance resolves those names to a
//! board and pin; the [`PinStateCache`] keeps the last level of every mapped
//! pin, fed from the board's change notifications, and backs input waits.

use crate::config::IoConfig;
use dashmap::DashMap;
use parking_lot::Mutex;
use station_core::limits::INPUT_POLL_INTERVAL;
use station_core::{
    CancelToken, DigitalIo, PinDirection, PinStateChange, StationError, StationResult,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Physical location of a logical pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinAddress {
    /// I/O board name
    pub device: String,
    /// Pin name on the board
    pub pin: String,
    /// Pin direction
    pub direction: PinDirection,
}

impl std::fmt::Display for PinAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.device, self.pin)
    }
}

/// Logical pin name to physical location.
#[derive(Debug, Clone, Default)]
pub struct IoPinMap {
    pins: BTreeMap<String, PinAddress>,
}

impl IoPinMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map built from the `[io]` configuration section.
    pub fn from_config(config: &IoConfig) -> Self {
        let pins = config
            .pins
            .iter()
            .map(|(name, pin)| {
                (
                    name.clone(),
                    PinAddress {
                        device: pin.device.clone(),
                        pin: pin.pin.clone(),
                        direction: pin.direction,
                    },
                )
            })
            .collect();
        Self { pins }
    }

    /// Add or replace a pin.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        device: impl Into<String>,
        pin: impl Into<String>,
        direction: PinDirection,
    ) {
        self.pins.insert(
            name.into(),
            PinAddress {
                device: device.into(),
                pin: pin.into(),
                direction,
            },
        );
    }

    /// Resolve a logical name.
    pub fn resolve(&self, name: &str) -> StationResult<&PinAddress> {
        self.pins
            .get(name)
            .ok_or_else(|| StationError::Configuration(format!("Unknown I/O pin '{}'", name)))
    }

    /// Resolve a logical name that must be an output.
    pub fn output(&self, name: &str) -> StationResult<&PinAddress> {
        self.with_direction(name, PinDirection::Output)
    }

    /// Resolve a logical name that must be an input.
    pub fn input(&self, name: &str) -> StationResult<&PinAddress> {
        self.with_direction(name, PinDirection::Input)
    }

    fn with_direction(&self, name: &str, direction: PinDirection) -> StationResult<&PinAddress> {
        let address = self.resolve(name)?;
        if address.direction != direction {
            return Err(StationError::Configuration(format!(
                "I/O pin '{}' is an {:?} pin, expected {:?}",
                name, address.direction, direction
            )));
        }
        Ok(address)
    }

    /// Logical name of a physical pin, if mapped.
    pub fn logical_name(&self, device: &str, pin: &str) -> Option<&str> {
        self.pins
            .iter()
            .find(|(_, a)| a.device == device && a.pin == pin)
            .map(|(name, _)| name.as_str())
    }

    /// Mapped pins by logical name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PinAddress)> {
        self.pins.iter().map(|(name, address)| (name.as_str(), address))
    }

    /// Number of mapped pins.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// True if no pins are mapped.
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Drive a named output high (`true`) or low (`false`).
///
/// A board that refuses the write is reported as an I/O error.
pub async fn write_output(
    io: &dyn DigitalIo,
    address: &PinAddress,
    state: bool,
) -> StationResult<()> {
    let accepted = if state {
        io.set_output(&address.device, &address.pin).await
    } else {
        io.clear_output(&address.device, &address.pin).await
    }
    .map_err(|e| StationError::io(&address.device, &address.pin, format!("{:#}", e)))?;

    if !accepted {
        return Err(StationError::io(
            &address.device,
            &address.pin,
            format!("board rejected {}", if state { "set" } else { "clear" }),
        ));
    }
    debug!(pin = %address, state, "Output written");
    Ok(())
}

/// Last known level of every mapped pin.
///
/// Seeded from the board and then fed by its change notifications; wait
/// loops poll the cache instead of the board. Readers never block the
/// listener.
#[derive(Debug, Default)]
pub struct PinStateCache {
    states: DashMap<(String, String), bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PinStateCache {
    /// Empty cache that follows nothing.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cache following `io` for every pin in `pins`.
    ///
    /// The listener subscribes before seeding, so no change falls between
    /// the initial read and the first notification. After a lagged
    /// notification stream every mapped pin is re-read from the board.
    pub fn follow(io: Arc<dyn DigitalIo>, pins: &IoPinMap) -> Arc<Self> {
        let cache = Self::new();
        let rx = io.subscribe();
        let handle = tokio::spawn(listen(Arc::downgrade(&cache), io, pins.clone(), rx));
        *cache.listener.lock() = Some(handle);
        cache
    }

    /// Record a level.
    pub fn update(&self, device: &str, pin: &str, state: bool) {
        self.states
            .insert((device.to_string(), pin.to_string()), state);
    }

    /// Last known level of a pin.
    pub fn get(&self, device: &str, pin: &str) -> Option<bool> {
        self.states
            .get(&(device.to_string(), pin.to_string()))
            .map(|entry| *entry.value())
    }

    /// Last known level of a mapped pin.
    pub fn get_address(&self, address: &PinAddress) -> Option<bool> {
        self.get(&address.device, &address.pin)
    }

    /// Number of pins with a known level.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True if no level has been recorded.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Re-read every pin of `pins` from the board.
    pub async fn refresh(&self, io: &dyn DigitalIo, pins: &IoPinMap) -> StationResult<()> {
        for (_, address) in pins.iter() {
            let state = io
                .pin_state(&address.device, &address.pin, address.direction)
                .await
                .map_err(|e| StationError::io(&address.device, &address.pin, format!("{:#}", e)))?;
            match state {
                Some(level) => self.update(&address.device, &address.pin, level),
                None => {
                    self.states
                        .remove(&(address.device.clone(), address.pin.clone()));
                }
            }
        }
        Ok(())
    }

    /// Wait until the input `name` at `address` reads `expected`.
    ///
    /// Polls the cache every [`INPUT_POLL_INTERVAL`] and returns the time
    /// waited, or a typed timeout once `timeout` has elapsed.
    pub async fn wait_for(
        &self,
        name: &str,
        address: &PinAddress,
        expected: bool,
        timeout: Duration,
        token: &CancelToken,
    ) -> StationResult<Duration> {
        let start = Instant::now();
        loop {
            if token.is_cancelled() {
                return Err(StationError::Cancelled(format!(
                    "wait for input '{}' interrupted",
                    name
                )));
            }
            let state = self.get_address(address);
            if state == Some(expected) {
                return Ok(start.elapsed());
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(StationError::timeout(
                    format!("Wait for input '{}' to become {}", name, expected),
                    elapsed,
                    timeout,
                ));
            }
            trace!(pin = %address, ?state, expected, "Input not yet at expected state");
            tokio::select! {
                _ = tokio::time::sleep(INPUT_POLL_INTERVAL.min(timeout - elapsed)) => {}
                _ = token.cancelled() => {}
            }
        }
    }
}

impl Drop for PinStateCache {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

async fn listen(
    cache: Weak<PinStateCache>,
    io: Arc<dyn DigitalIo>,
    pins: IoPinMap,
    mut rx: broadcast::Receiver<PinStateChange>,
) {
    if let Some(cache) = cache.upgrade() {
        if let Err(e) = cache.refresh(io.as_ref(), &pins).await {
            warn!(error = %e, "Initial pin-state read failed");
        }
    }
    loop {
        match rx.recv().await {
            Ok(change) => {
                let Some(cache) = cache.upgrade() else { break };
                cache.update(&change.device, &change.pin, change.state);
            }
            Err(RecvError::Lagged(skipped)) => {
                let Some(cache) = cache.upgrade() else { break };
                warn!(skipped, "Pin-state cache lagged, re-reading pins");
                if let Err(e) = cache.refresh(io.as_ref(), &pins).await {
                    warn!(error = %e, "Pin-state refresh failed");
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("Pin-state cache listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PinConfig;
    use crate::drivers::SimulatedIo;

    fn pin_map() -> IoPinMap {
        let mut config = IoConfig::default();
        config.pins.insert(
            "door_closed".into(),
            PinConfig {
                device: "io-main".into(),
                pin: "DI4".into(),
                direction: PinDirection::Input,
            },
        );
        config.pins.insert(
            "uv_lamp".into(),
            PinConfig {
                device: "io-main".into(),
                pin: "DO2".into(),
                direction: PinDirection::Output,
            },
        );
        IoPinMap::from_config(&config)
    }

    #[test]
    fn test_pin_map_resolves_by_direction() {
        let map = pin_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.output("uv_lamp").unwrap().pin, "DO2");
        assert!(map.output("door_closed").is_err());
        assert!(map.input("door_closed").is_ok());
        assert!(matches!(
            map.resolve("nope"),
            Err(StationError::Configuration(_))
        ));
        assert_eq!(map.logical_name("io-main", "DI4"), Some("door_closed"));
    }

    #[tokio::test]
    async fn test_write_output_updates_board() {
        let io = SimulatedIo::new();
        let map = pin_map();
        let lamp = map.output("uv_lamp").unwrap();
        write_output(io.as_ref(), lamp, true).await.unwrap();
        assert_eq!(
            io.pin_state("io-main", "DO2", PinDirection::Output)
                .await
                .unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_wait_for_sees_change() {
        let io = SimulatedIo::new();
        let map = pin_map();
        let door = map.input("door_closed").unwrap().clone();
        io.set_input("io-main", "DI4", false);
        let cache = PinStateCache::follow(io.clone(), &map);

        let writer = Arc::clone(&io);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            writer.set_input("io-main", "DI4", true);
        });

        let waited = cache
            .wait_for("door_closed", &door, true, Duration::from_secs(2), &CancelToken::new())
            .await
            .unwrap();
        assert!(waited >= Duration::from_millis(80));
        assert_eq!(cache.get("io-main", "DI4"), Some(true));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let io = SimulatedIo::new();
        let map = pin_map();
        let door = map.input("door_closed").unwrap().clone();
        let cache = PinStateCache::follow(io.clone(), &map);

        let err = cache
            .wait_for(
                "door_closed",
                &door,
                true,
                Duration::from_millis(120),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            StationError::Timeout { elapsed, limit, .. } => {
                assert_eq!(limit, Duration::from_millis(120));
                assert!(elapsed >= limit);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_is_seeded_from_board() {
        let io = SimulatedIo::new();
        io.set_input("io-main", "DI4", true);
        let map = pin_map();
        let door = map.input("door_closed").unwrap().clone();

        // Level set before the cache existed; only the initial read can see it.
        let cache = PinStateCache::follow(io.clone(), &map);
        cache
            .wait_for("door_closed", &door, true, Duration::from_secs(1), &CancelToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_recovers_missed_changes() {
        let io = SimulatedIo::new();
        let map = pin_map();
        let cache = PinStateCache::new();
        cache.update("io-main", "DI4", false);

        io.set_input("io-main", "DI4", true);
        assert_eq!(cache.get("io-main", "DI4"), Some(false));
        cache.refresh(io.as_ref(), &map).await.unwrap();
        assert_eq!(cache.get("io-main", "DI4"), Some(true));
    }

    #[tokio::test]
    async fn test_wait_for_cancelled() {
        let cache = PinStateCache::new();
        let door = pin_map().input("door_closed").unwrap().clone();
        let token = CancelToken::new();
        token.cancel();
        let err = cache
            .wait_for("door_closed", &door, true, Duration::from_secs(1), &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
