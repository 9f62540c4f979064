//! Car process internals.
//!
//! Two long-running loops share one [`lift_shm::CarStateSegment`]: the
//! [`engine`] advances the car's physical state (movement, doors, modes)
//! and the [`link`] keeps the dispatch controller informed while
//! accepting floor assignments. They cooperate exclusively through the
//! segment's lock and condition variable.

pub mod engine;
pub mod link;

pub use engine::CarEngine;
pub use link::ControllerLink;
