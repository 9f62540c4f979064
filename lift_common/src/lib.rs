//! Shared types for the lift workspace.
//!
//! Everything more than one process needs lives here: the floor label
//! codec, the door status vocabulary, the length-prefixed wire protocol
//! spoken between cars, call terminals and the controller, and the car
//! configuration struct. No crate in the workspace duplicates any of
//! these definitions.

pub mod config;
pub mod consts;
pub mod door;
pub mod floor;
pub mod protocol;

pub use config::{CarConfig, CarConfigFile, ConfigError};
pub use door::DoorStatus;
pub use floor::{Direction, FloorError, FloorLabel};
pub use protocol::{Message, ProtocolError, recv_message, send_message, try_recv_message};
