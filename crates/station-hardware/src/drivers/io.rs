//! Simulated digital I/O board.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use station_core::{DigitalIo, PinDirection, PinStateChange};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

const NOTIFY_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
struct PinSlot {
    direction: PinDirection,
    state: bool,
}

#[derive(Debug)]
struct Board {
    pins: DashMap<(String, String), PinSlot>,
    tx: broadcast::Sender<PinStateChange>,
}

impl Board {
    fn write(&self, device: &str, pin: &str, direction: PinDirection, state: bool) {
        let key = (device.to_string(), pin.to_string());
        let changed = match self.pins.insert(key, PinSlot { direction, state }) {
            Some(previous) => previous.state != state,
            None => true,
        };
        if changed {
            trace!(device, pin, state, "Simulated pin changed");
            let _ = self.tx.send(PinStateChange {
                device: device.to_string(),
                pin: pin.to_string(),
                direction,
                state,
            });
        }
    }
}

#[derive(Debug)]
struct SlidePhysics {
    valve: (String, String),
    up: (String, String),
    down: (String, String),
    active_high: bool,
    travel: Duration,
    generation: Arc<AtomicU64>,
}

/// Simulated I/O board(s) with optional slide physics.
///
/// Pins come into existence on first write. Attached slides flip their end
/// sensors after `travel` whenever their valve output changes level.
#[derive(Debug)]
pub struct SimulatedIo {
    board: Arc<Board>,
    slides: Mutex<Vec<SlidePhysics>>,
    writes: AtomicUsize,
    reject_writes: AtomicBool,
}

impl SimulatedIo {
    /// Board with no pins.
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Arc::new(Self {
            board: Arc::new(Board {
                pins: DashMap::new(),
                tx,
            }),
            slides: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            reject_writes: AtomicBool::new(false),
        })
    }

    /// Drive a sensor input from the outside world.
    pub fn set_input(&self, device: &str, pin: &str, state: bool) {
        self.board.write(device, pin, PinDirection::Input, state);
    }

    /// Number of output writes accepted so far.
    pub fn output_write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the board refuse every output write.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Simulate a slide driven by `valve` with sensors `up` and `down`.
    ///
    /// The sensors are initialised to match the current valve level.
    pub fn attach_slide(
        &self,
        valve: (&str, &str),
        up: (&str, &str),
        down: (&str, &str),
        active_high: bool,
        travel: Duration,
    ) {
        let level = self
            .board
            .pins
            .get(&(valve.0.to_string(), valve.1.to_string()))
            .is_some_and(|slot| slot.state);
        let extended = level == active_high;
        self.board.write(valve.0, valve.1, PinDirection::Output, level);
        self.set_input(up.0, up.1, !extended);
        self.set_input(down.0, down.1, extended);

        self.slides.lock().push(SlidePhysics {
            valve: (valve.0.to_string(), valve.1.to_string()),
            up: (up.0.to_string(), up.1.to_string()),
            down: (down.0.to_string(), down.1.to_string()),
            active_high,
            travel,
            generation: Arc::new(AtomicU64::new(0)),
        });
    }

    fn write_output(&self, device: &str, pin: &str, state: bool) -> bool {
        if self.reject_writes.load(Ordering::SeqCst) {
            return false;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.board.write(device, pin, PinDirection::Output, state);

        let slides = self.slides.lock();
        for slide in slides
            .iter()
            .filter(|s| s.valve.0 == device && s.valve.1 == pin)
        {
            let extend = state == slide.active_high;
            let (leaving, arriving) = if extend {
                (slide.up.clone(), slide.down.clone())
            } else {
                (slide.down.clone(), slide.up.clone())
            };
            self.board
                .write(&leaving.0, &leaving.1, PinDirection::Input, false);

            let generation = slide.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let counter = Arc::clone(&slide.generation);
            let board = Arc::clone(&self.board);
            let travel = slide.travel;
            tokio::spawn(async move {
                tokio::time::sleep(travel).await;
                if counter.load(Ordering::SeqCst) == generation {
                    board.write(&arriving.0, &arriving.1, PinDirection::Input, true);
                }
            });
        }
        true
    }
}

#[async_trait]
impl DigitalIo for SimulatedIo {
    async fn set_output(&self, device: &str, pin: &str) -> Result<bool> {
        Ok(self.write_output(device, pin, true))
    }

    async fn clear_output(&self, device: &str, pin: &str) -> Result<bool> {
        Ok(self.write_output(device, pin, false))
    }

    async fn pin_state(
        &self,
        device: &str,
        pin: &str,
        direction: PinDirection,
    ) -> Result<Option<bool>> {
        Ok(self
            .board
            .pins
            .get(&(device.to_string(), pin.to_string()))
            .filter(|slot| slot.direction == direction)
            .map(|slot| slot.state))
    }

    fn subscribe(&self) -> broadcast::Receiver<PinStateChange> {
        self.board.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outputs_notify_once_per_change() {
        let io = SimulatedIo::new();
        let mut rx = io.subscribe();

        assert!(io.set_output("io", "DO1").await.unwrap());
        assert!(io.set_output("io", "DO1").await.unwrap());
        assert_eq!(io.output_write_count(), 2);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.pin, "DO1");
        assert!(change.state);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_pin_and_direction_mismatch() {
        let io = SimulatedIo::new();
        assert_eq!(io.pin_state("io", "DI9", PinDirection::Input).await.unwrap(), None);
        io.set_input("io", "DI1", true);
        assert_eq!(io.pin_state("io", "DI1", PinDirection::Output).await.unwrap(), None);
        assert_eq!(io.pin_state("io", "DI1", PinDirection::Input).await.unwrap(), Some(true));
    }

    #[tokio::test]
    async fn test_rejected_writes() {
        let io = SimulatedIo::new();
        io.set_reject_writes(true);
        assert!(!io.set_output("io", "DO1").await.unwrap());
        assert_eq!(io.output_write_count(), 0);
    }

    #[tokio::test]
    async fn test_slide_physics_moves_sensors() {
        let io = SimulatedIo::new();
        io.attach_slide(("io", "DO1"), ("io", "DI1"), ("io", "DI2"), true, Duration::from_millis(30));
        assert_eq!(io.pin_state("io", "DI1", PinDirection::Input).await.unwrap(), Some(true));

        io.set_output("io", "DO1").await.unwrap();
        assert_eq!(io.pin_state("io", "DI1", PinDirection::Input).await.unwrap(), Some(false));
        assert_eq!(io.pin_state("io", "DI2", PinDirection::Input).await.unwrap(), Some(false));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(io.pin_state("io", "DI2", PinDirection::Input).await.unwrap(), Some(true));
    }
}
