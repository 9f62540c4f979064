//! Shared car state over named POSIX shared memory.
//!
//! Each car publishes one [`CarSharedState`] record in a segment named
//! after the car (`/car<name>`). The record starts with a process-shared
//! mutex and condition variable; every field access, including
//! single-field reads, happens under the mutex, and every mutation path
//! broadcasts the condition variable so waiters in any process observe
//! the change without polling blindly.
//!
//! The car process [`create`](segment::CarStateSegment::create)s the
//! segment at startup and unlinks it on shutdown; control utilities and
//! the car's own network thread [`attach`](segment::CarStateSegment::attach)
//! by name. This segment is the system's sole inter-process shared
//! resource.
//!
//! ```no_run
//! use lift_shm::CarStateSegment;
//!
//! # fn main() -> Result<(), lift_shm::ShmError> {
//! let segment = CarStateSegment::attach("A")?;
//! let floor = segment.with_lock(|state| state.current_floor());
//! println!("car A is at {floor}");
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod error;
pub mod segment;
pub mod state;
mod sync;

pub use control::ControlError;
pub use error::ShmError;
pub use segment::{CarStateGuard, CarStateSegment};
pub use state::{CarData, CarSharedState};
