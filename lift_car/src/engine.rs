//! The car state machine.
//!
//! One iteration observes the shared record under the lock, decides on at
//! most one physical step (a one-floor move or a door operation), then
//! performs that step with every simulated delay elapsed *outside* the
//! lock, so control utilities and the network thread are never starved
//! for the duration of a move or a door cycle. Idle iterations block on the
//! condition variable with a timeout instead of spinning.
//!
//! Mode rules:
//! - Normal: the car moves toward the destination whenever the doors are
//!   closed, and runs a full automatic door cycle on arrival.
//! - Individual service: movement comes only from destination writes by
//!   the manual controls; out-of-range destinations are reset to the
//!   current floor; doors respond to buttons but never cycle on their
//!   own.
//! - Emergency: movement and automatic door cycling are suspended; only
//!   manual door buttons are honored. Entered when a safety input
//!   (`emergency_stop`, `overload`) is observed; never exited
//!   automatically.

use lift_common::config::CarConfig;
use lift_common::door::DoorStatus;
use lift_shm::segment::{CarStateGuard, CarStateSegment};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The single physical step chosen by one observation of the record.
enum Step {
    /// Begin a one-floor move toward the destination.
    Move,
    /// Doors were commanded open (status already set to `Opening`).
    OpenDoors { auto_close: bool },
    /// Doors were commanded closed (status already set to `Closing`).
    CloseDoors,
    /// A button flag was cleared with no door effect.
    FlagOnly,
    /// Nothing to do; wait for a change.
    Idle,
}

/// The simulation loop for one car.
pub struct CarEngine {
    segment: Arc<CarStateSegment>,
    travel_delay: Duration,
    door_delay: Duration,
    open_dwell: Duration,
    running: Arc<AtomicBool>,
}

impl CarEngine {
    pub fn new(segment: Arc<CarStateSegment>, config: &CarConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            segment,
            travel_delay: config.travel_delay,
            door_delay: config.door_delay,
            open_dwell: config.open_dwell,
            running,
        }
    }

    /// Run until the shared running flag is cleared.
    pub fn run(&self) {
        info!(car = %self.segment.car_name(), "state machine started");
        while self.active() {
            self.tick();
        }
        info!(car = %self.segment.car_name(), "state machine stopped");
    }

    fn active(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Sleep for a simulated delay. Delays are short and bounded, so
    /// shutdown latency is at most one delay period.
    fn pause(&self, duration: Duration) {
        if self.active() {
            std::thread::sleep(duration);
        }
    }

    fn tick(&self) {
        let mut guard = self.segment.lock();
        self.latch_safety_inputs(&mut guard);
        self.clamp_destination(&mut guard);

        let manual = guard.emergency_mode() || guard.individual_service_mode();

        let step = if !guard.emergency_mode()
            && guard.door_status() == DoorStatus::Closed
            && guard.current_floor() != guard.destination_floor()
        {
            Step::Move
        } else if guard.open_button() {
            guard.set_open_button(false);
            match guard.door_status() {
                DoorStatus::Closed | DoorStatus::Closing => {
                    guard.set_door_status(DoorStatus::Opening);
                    Step::OpenDoors {
                        auto_close: !manual,
                    }
                }
                // Opening/Open: nothing to do. Between: door operations
                // are forbidden in transit; the press is dropped.
                _ => Step::FlagOnly,
            }
        } else if guard.close_button() {
            guard.set_close_button(false);
            if guard.door_status() == DoorStatus::Open {
                guard.set_door_status(DoorStatus::Closing);
                Step::CloseDoors
            } else {
                Step::FlagOnly
            }
        } else {
            Step::Idle
        };

        match step {
            Step::Move => {
                drop(guard);
                self.transit();
            }
            Step::OpenDoors { auto_close } => {
                guard.broadcast();
                drop(guard);
                self.finish_opening();
                if auto_close {
                    self.dwell_then_close();
                }
            }
            Step::CloseDoors => {
                guard.broadcast();
                drop(guard);
                self.finish_closing();
            }
            Step::FlagOnly => guard.broadcast(),
            Step::Idle => {
                guard.wait_timeout(self.travel_delay);
            }
        }
    }

    /// Safety inputs assert emergency mode, which displaces service mode.
    fn latch_safety_inputs(&self, guard: &mut CarStateGuard<'_>) {
        if (guard.emergency_stop() || guard.overload()) && !guard.emergency_mode() {
            warn!(car = %self.segment.car_name(), "safety input asserted; entering emergency mode");
            guard.set_emergency_mode(true);
            guard.set_individual_service_mode(false);
            guard.broadcast();
        }
    }

    /// A destination outside the travel range is corrected in place, not
    /// acted on: reset to the current floor rather than erroring.
    fn clamp_destination(&self, guard: &mut CarStateGuard<'_>) {
        let current = guard.current_floor();
        let destination = guard.destination_floor();
        if destination != current && !guard.in_travel_range(destination) {
            warn!(
                car = %self.segment.car_name(),
                %destination,
                "destination outside travel range; resetting"
            );
            guard.set_destination_floor(current);
            guard.broadcast();
        }
    }

    /// One floor of travel: `Closed → Between`, travel delay, advance by
    /// exactly one floor, `Between → Closed`, then an automatic door
    /// cycle if the car arrived in normal mode.
    fn transit(&self) {
        {
            let mut guard = self.segment.lock();
            // The lock was released since the decision; re-validate.
            if guard.emergency_mode()
                || guard.door_status() != DoorStatus::Closed
                || guard.current_floor() == guard.destination_floor()
            {
                return;
            }
            guard.set_door_status(DoorStatus::Between);
            guard.broadcast();
        }

        self.pause(self.travel_delay);

        let (arrived, auto_cycle) = {
            let mut guard = self.segment.lock();
            let next = guard.current_floor().step_toward(guard.destination_floor());
            guard.set_current_floor(next);
            guard.set_door_status(DoorStatus::Closed);
            guard.broadcast();
            debug!(car = %self.segment.car_name(), floor = %next, "moved one floor");
            (
                next == guard.destination_floor(),
                !guard.individual_service_mode() && !guard.emergency_mode(),
            )
        };

        if arrived && auto_cycle {
            {
                let mut guard = self.segment.lock();
                if guard.door_status() != DoorStatus::Closed {
                    return;
                }
                guard.set_door_status(DoorStatus::Opening);
                guard.broadcast();
            }
            self.finish_opening();
            self.dwell_then_close();
        }
    }

    /// Complete an `Opening → Open` transition after the door delay.
    fn finish_opening(&self) {
        self.pause(self.door_delay);
        let mut guard = self.segment.lock();
        guard.set_door_status(DoorStatus::Open);
        guard.broadcast();
    }

    /// Complete a `Closing → Closed` transition, unless an open press or
    /// an obstruction landed during the delay; then the door reopens
    /// instead of committing `Closed`.
    fn finish_closing(&self) {
        self.pause(self.door_delay);
        let reopened = {
            let mut guard = self.segment.lock();
            if guard.open_button() || guard.door_obstruction() {
                guard.set_open_button(false);
                guard.set_door_status(DoorStatus::Opening);
                guard.broadcast();
                true
            } else {
                guard.set_door_status(DoorStatus::Closed);
                guard.broadcast();
                false
            }
        };
        if reopened {
            self.finish_opening();
        }
    }

    /// The automatic part of a door cycle: hold the doors open for the
    /// dwell (a close press cuts it short, an open press restarts it),
    /// then close, reopening and retrying as long as an open press or an
    /// obstruction interferes. Returns with the doors `Closed`, or `Open`
    /// if a mode change handed the doors to manual control mid-cycle.
    fn dwell_then_close(&self) {
        loop {
            {
                let mut guard = self.segment.lock();
                let mut deadline = Instant::now() + self.open_dwell;
                loop {
                    if !self.active() {
                        return;
                    }
                    if guard.emergency_mode() || guard.individual_service_mode() {
                        // Manual control owns the doors now.
                        return;
                    }
                    if guard.close_button() {
                        guard.set_close_button(false);
                        guard.broadcast();
                        break;
                    }
                    if guard.open_button() {
                        guard.set_open_button(false);
                        guard.broadcast();
                        deadline = Instant::now() + self.open_dwell;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    guard.wait_timeout(deadline - now);
                }
                guard.set_door_status(DoorStatus::Closing);
                guard.broadcast();
            }

            self.pause(self.door_delay);

            {
                let mut guard = self.segment.lock();
                if guard.open_button() || guard.door_obstruction() {
                    guard.set_open_button(false);
                    guard.set_door_status(DoorStatus::Opening);
                    guard.broadcast();
                } else {
                    guard.set_door_status(DoorStatus::Closed);
                    guard.broadcast();
                    return;
                }
            }

            self.pause(self.door_delay);

            {
                let mut guard = self.segment.lock();
                guard.set_door_status(DoorStatus::Open);
                guard.broadcast();
            }
        }
    }
}
