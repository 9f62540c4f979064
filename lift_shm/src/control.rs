//! The control interface: operations external utilities invoke on a car.
//!
//! Every operation takes the segment lock for its whole duration.
//! Successful mutations broadcast the change; rejections report a typed
//! reason to the caller and leave every field untouched.

use crate::segment::CarStateSegment;
use lift_common::door::DoorStatus;
use lift_common::floor::{Direction, FloorLabel};
use thiserror::Error;

/// Why a control operation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Manual moves require individual service mode.
    #[error("operation only allowed in individual service mode")]
    InvalidMode,

    /// Doors must be fully closed before a move.
    #[error("operation not allowed while doors are open")]
    DoorsOpen,

    /// The car is in transit between floors.
    #[error("operation not allowed while the car is moving")]
    AlreadyMoving,

    /// The adjacent floor does not exist or lies outside the car's range.
    #[error("cannot move further in that direction")]
    FloorOutOfRange,
}

impl CarStateSegment {
    /// Request the doors to open.
    pub fn press_open(&self) {
        self.update(|state| state.set_open_button(true));
    }

    /// Request the doors to close.
    pub fn press_close(&self) {
        self.update(|state| state.set_close_button(true));
    }

    /// Emergency stop: assert emergency mode.
    ///
    /// Emergency mode displaces individual service mode; it has no
    /// automatic exit; an operator clears it by enabling service mode.
    pub fn press_stop(&self) {
        self.update(|state| {
            state.set_emergency_mode(true);
            state.set_individual_service_mode(false);
        });
    }

    /// Enable or disable individual service mode.
    ///
    /// Enabling also clears emergency mode; this is the operator's
    /// recovery path after an emergency stop.
    pub fn set_service_mode(&self, enabled: bool) {
        self.update(|state| {
            state.set_individual_service_mode(enabled);
            if enabled {
                state.set_emergency_mode(false);
            }
        });
    }

    /// Move one floor up or down under manual control.
    ///
    /// Returns the new destination floor on success.
    pub fn request_move(&self, direction: Direction) -> Result<FloorLabel, ControlError> {
        let mut guard = self.lock();

        if !guard.individual_service_mode() {
            return Err(ControlError::InvalidMode);
        }
        match guard.door_status() {
            DoorStatus::Between => return Err(ControlError::AlreadyMoving),
            DoorStatus::Closed => {}
            _ => return Err(ControlError::DoorsOpen),
        }

        let next = guard
            .current_floor()
            .step(direction)
            .map_err(|_| ControlError::FloorOutOfRange)?;
        if !guard.in_travel_range(next) {
            return Err(ControlError::FloorOutOfRange);
        }

        guard.set_destination_floor(next);
        guard.broadcast();
        Ok(next)
    }
}
