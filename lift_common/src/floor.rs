//! Floor label codec.
//!
//! A floor is a small signed integer: regular floors `1..=999` render as
//! decimal digits, basements `-1..=-99` render as `B1..B99`. Floor 0 does
//! not exist; stepping across the ground skips it in both directions.
//! Parsing is the exact inverse of rendering; anything else (signs,
//! leading zeros, lowercase `b`, whitespace) is rejected.

use crate::consts::{FLOOR_MAX, FLOOR_MIN};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from floor label construction, parsing and stepping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FloorError {
    /// Numeric value outside `B99..=999` (or exactly 0).
    #[error("floor {0} is outside the valid range B99..999")]
    OutOfRange(i32),

    /// Textual form that no valid floor renders to.
    #[error("invalid floor label: {0:?}")]
    InvalidLabel(String),
}

/// Direction of a single-floor manual move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// A validated floor label.
///
/// Ordering follows the building: `B99 < B1 < 1 < 999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FloorLabel(i16);

impl FloorLabel {
    /// Lowest valid floor (B99).
    pub const MIN: FloorLabel = FloorLabel(FLOOR_MIN);
    /// Highest valid floor (999).
    pub const MAX: FloorLabel = FloorLabel(FLOOR_MAX);
    /// The ground floor, used as a safe fallback for corrupted raw values.
    pub const GROUND: FloorLabel = FloorLabel(1);

    /// Validate a raw integer as a floor.
    pub fn from_raw(raw: i16) -> Result<Self, FloorError> {
        if raw == 0 || !(FLOOR_MIN..=FLOOR_MAX).contains(&raw) {
            return Err(FloorError::OutOfRange(raw as i32));
        }
        Ok(FloorLabel(raw))
    }

    /// The raw signed value (negative for basements).
    #[inline]
    pub const fn raw(self) -> i16 {
        self.0
    }

    /// Whether this is a basement floor.
    #[inline]
    pub const fn is_basement(self) -> bool {
        self.0 < 0
    }

    /// The adjacent floor in `dir`, skipping the nonexistent floor 0.
    ///
    /// Fails at the absolute bounds of the labeling scheme.
    pub fn step(self, dir: Direction) -> Result<Self, FloorError> {
        let next = match dir {
            Direction::Up => {
                if self.0 + 1 == 0 {
                    1
                } else {
                    self.0 + 1
                }
            }
            Direction::Down => {
                if self.0 - 1 == 0 {
                    -1
                } else {
                    self.0 - 1
                }
            }
        };
        Self::from_raw(next)
    }

    /// One floor closer to `dest` (or `self` when already there).
    ///
    /// Both endpoints are valid labels, so the intermediate step cannot
    /// leave the valid range.
    pub fn step_toward(self, dest: FloorLabel) -> FloorLabel {
        use std::cmp::Ordering;
        match self.0.cmp(&dest.0) {
            Ordering::Equal => self,
            Ordering::Less => {
                let next = self.0 + 1;
                FloorLabel(if next == 0 { 1 } else { next })
            }
            Ordering::Greater => {
                let next = self.0 - 1;
                FloorLabel(if next == 0 { -1 } else { next })
            }
        }
    }
}

impl fmt::Display for FloorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "B{}", -self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for FloorLabel {
    type Err = FloorError;

    fn from_str(s: &str) -> Result<Self, FloorError> {
        let invalid = || FloorError::InvalidLabel(s.to_string());

        let (digits, sign) = match s.strip_prefix('B') {
            Some(rest) => (rest, -1i16),
            None => (s, 1i16),
        };

        // Exact inverse of rendering: plain digits, no leading zero.
        if digits.is_empty()
            || digits.len() > 3
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || digits.starts_with('0')
        {
            return Err(invalid());
        }

        let value: i16 = digits.parse().map_err(|_| invalid())?;
        Self::from_raw(sign * value).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn renders_regular_and_basement_floors() {
        assert_eq!(FloorLabel::from_raw(1).unwrap().to_string(), "1");
        assert_eq!(FloorLabel::from_raw(999).unwrap().to_string(), "999");
        assert_eq!(FloorLabel::from_raw(-1).unwrap().to_string(), "B1");
        assert_eq!(FloorLabel::from_raw(-99).unwrap().to_string(), "B99");
    }

    #[test]
    fn parses_valid_labels() {
        assert_eq!("1".parse::<FloorLabel>().unwrap().raw(), 1);
        assert_eq!("42".parse::<FloorLabel>().unwrap().raw(), 42);
        assert_eq!("999".parse::<FloorLabel>().unwrap().raw(), 999);
        assert_eq!("B1".parse::<FloorLabel>().unwrap().raw(), -1);
        assert_eq!("B99".parse::<FloorLabel>().unwrap().raw(), -99);
    }

    #[test]
    fn rejects_invalid_labels() {
        for bad in [
            "", "0", "B0", "B", "-1", "+5", "007", "B07", "b2", "1000", "B100", " 5", "5 ", "5.0",
            "B1B",
        ] {
            assert!(
                bad.parse::<FloorLabel>().is_err(),
                "label {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_raw_values() {
        assert_eq!(FloorLabel::from_raw(0), Err(FloorError::OutOfRange(0)));
        assert_eq!(FloorLabel::from_raw(1000), Err(FloorError::OutOfRange(1000)));
        assert_eq!(FloorLabel::from_raw(-100), Err(FloorError::OutOfRange(-100)));
    }

    #[test]
    fn stepping_skips_floor_zero() {
        let ground = FloorLabel::from_raw(1).unwrap();
        let b1 = FloorLabel::from_raw(-1).unwrap();
        assert_eq!(ground.step(Direction::Down).unwrap(), b1);
        assert_eq!(b1.step(Direction::Up).unwrap(), ground);
    }

    #[test]
    fn stepping_fails_at_bounds() {
        assert!(FloorLabel::MAX.step(Direction::Up).is_err());
        assert!(FloorLabel::MIN.step(Direction::Down).is_err());
    }

    #[test]
    fn step_toward_moves_one_floor() {
        let five = FloorLabel::from_raw(5).unwrap();
        let b2 = FloorLabel::from_raw(-2).unwrap();
        assert_eq!(five.step_toward(b2).raw(), 4);
        assert_eq!(b2.step_toward(five).raw(), -1);
        // Crossing ground in both directions.
        assert_eq!(FloorLabel::from_raw(1).unwrap().step_toward(b2).raw(), -1);
        assert_eq!(FloorLabel::from_raw(-1).unwrap().step_toward(five).raw(), 1);
        // Already there.
        assert_eq!(five.step_toward(five), five);
    }

    #[test]
    fn ordering_follows_the_building() {
        let order = ["B99", "B2", "B1", "1", "2", "999"];
        let floors: Vec<FloorLabel> = order.iter().map(|s| s.parse().unwrap()).collect();
        let mut sorted = floors.clone();
        sorted.sort();
        assert_eq!(floors, sorted);
    }

    proptest! {
        #[test]
        fn render_parse_round_trip(raw in (FLOOR_MIN..=FLOOR_MAX).prop_filter("no floor 0", |v| *v != 0)) {
            let floor = FloorLabel::from_raw(raw).unwrap();
            let parsed: FloorLabel = floor.to_string().parse().unwrap();
            prop_assert_eq!(parsed, floor);
        }
    }
}
