//! Shared harness for car integration tests.
//!
//! Spins up the engine (and optionally the controller link) against a
//! real shared-memory segment with millisecond-scale delays, and offers
//! bounded wait helpers so timing-sensitive assertions never hang a
//! failing run.

#![allow(dead_code)]

use lift_car::{CarEngine, ControllerLink};
use lift_common::config::CarConfig;
use lift_common::door::DoorStatus;
use lift_common::floor::FloorLabel;
use lift_shm::{CarData, CarStateSegment};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub fn floor(s: &str) -> FloorLabel {
    s.parse().unwrap()
}

/// Unique car names so parallel tests never collide on a segment.
pub fn unique_name(suffix: &str) -> String {
    format!("itest{}_{}", std::process::id(), suffix)
}

/// A car configuration with delays short enough for tests but long
/// enough that transitions are observable.
pub fn fast_config(suffix: &str, lowest: &str, highest: &str) -> CarConfig {
    let mut config =
        CarConfig::new(unique_name(suffix), floor(lowest), floor(highest), 10).unwrap();
    config.travel_delay = Duration::from_millis(15);
    config.door_delay = Duration::from_millis(10);
    config.open_dwell = Duration::from_millis(40);
    config.report_interval = Duration::from_millis(25);
    config.reconnect_backoff = Duration::from_millis(20);
    config
}

/// A running car: engine thread, optional link thread, and the owning
/// segment handle. Threads stop and the segment unlinks on drop.
pub struct CarHarness {
    pub segment: Arc<CarStateSegment>,
    pub config: CarConfig,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl CarHarness {
    /// Start just the engine.
    pub fn start_engine(config: CarConfig) -> Self {
        Self::start(config, false)
    }

    /// Start the engine and the controller link.
    pub fn start_with_link(config: CarConfig) -> Self {
        Self::start(config, true)
    }

    fn start(config: CarConfig, with_link: bool) -> Self {
        let segment = Arc::new(CarStateSegment::create(&config).unwrap());
        let running = Arc::new(AtomicBool::new(true));
        let mut threads = Vec::new();

        {
            let engine = CarEngine::new(Arc::clone(&segment), &config, Arc::clone(&running));
            threads.push(std::thread::spawn(move || engine.run()));
        }
        if with_link {
            let link = ControllerLink::new(
                Arc::clone(&segment),
                config.clone(),
                Arc::clone(&running),
            );
            threads.push(std::thread::spawn(move || link.run()));
        }

        Self {
            segment,
            config,
            running,
            threads,
        }
    }

    /// Poll the shared record until `pred` holds. Returns `false` on
    /// timeout so callers can assert with context.
    pub fn wait_until(&self, timeout: Duration, pred: impl Fn(&CarData) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.segment.with_lock(|state| pred(state)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Wait until the car is standing still with the doors closed.
    pub fn settle(&self) {
        assert!(
            self.wait_until(Duration::from_secs(3), |state| {
                state.door_status() == DoorStatus::Closed
                    && state.current_floor() == state.destination_floor()
            }),
            "car failed to settle"
        );
    }
}

impl Drop for CarHarness {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Wake any condvar waiters so the loops observe the flag promptly.
        self.segment.update(|_| {});
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
