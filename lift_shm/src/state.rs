//! The shared car state record.
//!
//! Fixed `#[repr(C)]` layout: any process that maps the segment,
//! including one from a different build, sees the same bytes, guarded
//! by the magic word published last during initialization.

use crate::sync::SyncBlock;
use lift_common::door::DoorStatus;
use lift_common::floor::FloorLabel;
use static_assertions::{const_assert, const_assert_eq};

/// Magic word published after the record is fully initialized.
pub const CAR_SHM_MAGIC: u64 = 0x4C49_4654_4341_5231; // "LIFTCAR1"

/// Size of the mapped segment: one page, far above the record size.
pub const CAR_SHM_SIZE: usize = 4096;

/// The complete shared record for one car.
#[repr(C)]
pub struct CarSharedState {
    /// Process-shared mutex + condition variable. Must stay first.
    pub(crate) sync: SyncBlock,
    /// [`CAR_SHM_MAGIC`] once initialization is complete.
    pub(crate) magic: u64,
    /// The lock-protected data block.
    pub(crate) data: CarData,
}

/// The lock-protected fields of a car.
///
/// All fields are private; accessors convert the raw ABI types to the
/// validated domain types, falling back to safe defaults if a foreign
/// writer ever stores a byte this build does not recognize.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CarData {
    current_floor: i16,
    destination_floor: i16,
    lowest_floor: i16,
    highest_floor: i16,
    door_status: u8,
    open_button: u8,
    close_button: u8,
    door_obstruction: u8,
    overload: u8,
    emergency_stop: u8,
    individual_service_mode: u8,
    emergency_mode: u8,
}

const_assert_eq!(std::mem::size_of::<CarData>(), 16);
const_assert!(std::mem::size_of::<CarSharedState>() <= CAR_SHM_SIZE);

impl CarData {
    /// The startup state: parked at the lowest floor, doors closed, every
    /// flag clear.
    pub(crate) fn new(lowest: FloorLabel, highest: FloorLabel) -> Self {
        Self {
            current_floor: lowest.raw(),
            destination_floor: lowest.raw(),
            lowest_floor: lowest.raw(),
            highest_floor: highest.raw(),
            door_status: DoorStatus::Closed as u8,
            open_button: 0,
            close_button: 0,
            door_obstruction: 0,
            overload: 0,
            emergency_stop: 0,
            individual_service_mode: 0,
            emergency_mode: 0,
        }
    }

    // ── Floors ──

    pub fn current_floor(&self) -> FloorLabel {
        FloorLabel::from_raw(self.current_floor).unwrap_or(FloorLabel::GROUND)
    }

    pub fn set_current_floor(&mut self, floor: FloorLabel) {
        self.current_floor = floor.raw();
    }

    pub fn destination_floor(&self) -> FloorLabel {
        FloorLabel::from_raw(self.destination_floor).unwrap_or(FloorLabel::GROUND)
    }

    pub fn set_destination_floor(&mut self, floor: FloorLabel) {
        self.destination_floor = floor.raw();
    }

    /// Lowest floor this car serves; written once at initialization.
    pub fn lowest_floor(&self) -> FloorLabel {
        FloorLabel::from_raw(self.lowest_floor).unwrap_or(FloorLabel::GROUND)
    }

    /// Highest floor this car serves; written once at initialization.
    pub fn highest_floor(&self) -> FloorLabel {
        FloorLabel::from_raw(self.highest_floor).unwrap_or(FloorLabel::GROUND)
    }

    /// Whether `floor` lies within this car's configured travel range.
    pub fn in_travel_range(&self, floor: FloorLabel) -> bool {
        (self.lowest_floor..=self.highest_floor).contains(&floor.raw())
    }

    // ── Door / motion status ──

    pub fn door_status(&self) -> DoorStatus {
        DoorStatus::from_u8(self.door_status).unwrap_or_default()
    }

    pub fn set_door_status(&mut self, status: DoorStatus) {
        self.door_status = status as u8;
    }

    // ── Button flags ──

    pub fn open_button(&self) -> bool {
        self.open_button != 0
    }

    pub fn set_open_button(&mut self, pressed: bool) {
        self.open_button = pressed as u8;
    }

    pub fn close_button(&self) -> bool {
        self.close_button != 0
    }

    pub fn set_close_button(&mut self, pressed: bool) {
        self.close_button = pressed as u8;
    }

    // ── Safety inputs ──

    pub fn door_obstruction(&self) -> bool {
        self.door_obstruction != 0
    }

    pub fn set_door_obstruction(&mut self, detected: bool) {
        self.door_obstruction = detected as u8;
    }

    pub fn overload(&self) -> bool {
        self.overload != 0
    }

    pub fn set_overload(&mut self, detected: bool) {
        self.overload = detected as u8;
    }

    pub fn emergency_stop(&self) -> bool {
        self.emergency_stop != 0
    }

    pub fn set_emergency_stop(&mut self, pressed: bool) {
        self.emergency_stop = pressed as u8;
    }

    // ── Modes ──

    pub fn individual_service_mode(&self) -> bool {
        self.individual_service_mode != 0
    }

    pub fn set_individual_service_mode(&mut self, enabled: bool) {
        self.individual_service_mode = enabled as u8;
    }

    pub fn emergency_mode(&self) -> bool {
        self.emergency_mode != 0
    }

    pub fn set_emergency_mode(&mut self, enabled: bool) {
        self.emergency_mode = enabled as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor(s: &str) -> FloorLabel {
        s.parse().unwrap()
    }

    #[test]
    fn startup_state_is_parked_at_the_lowest_floor() {
        let data = CarData::new(floor("B2"), floor("10"));
        assert_eq!(data.current_floor(), floor("B2"));
        assert_eq!(data.destination_floor(), floor("B2"));
        assert_eq!(data.door_status(), DoorStatus::Closed);
        assert!(!data.open_button());
        assert!(!data.close_button());
        assert!(!data.door_obstruction());
        assert!(!data.overload());
        assert!(!data.emergency_stop());
        assert!(!data.individual_service_mode());
        assert!(!data.emergency_mode());
    }

    #[test]
    fn travel_range_is_inclusive() {
        let data = CarData::new(floor("1"), floor("10"));
        assert!(data.in_travel_range(floor("1")));
        assert!(data.in_travel_range(floor("10")));
        assert!(!data.in_travel_range(floor("11")));
        assert!(!data.in_travel_range(floor("B1")));
    }

    #[test]
    fn corrupted_raw_bytes_fall_back_to_safe_defaults() {
        let mut data = CarData::new(floor("1"), floor("10"));
        data.current_floor = 0; // not a valid floor
        data.door_status = 200; // not a valid status
        assert_eq!(data.current_floor(), FloorLabel::GROUND);
        assert_eq!(data.door_status(), DoorStatus::Closed);
    }
}
