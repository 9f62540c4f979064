//! Error types for shared-state segment operations.

use thiserror::Error;

/// Errors that can occur while creating, attaching or locking a car's
/// shared state segment.
#[derive(Debug, Error)]
pub enum ShmError {
    /// A segment with this car name already exists and could not be
    /// replaced.
    #[error("car segment already exists: {name}")]
    AlreadyExists {
        /// Car name.
        name: String,
    },

    /// No segment exists for this car name.
    #[error("car segment not found: {name}")]
    NotFound {
        /// Car name.
        name: String,
    },

    /// The segment exists but its size or magic word does not match this
    /// build's record layout.
    #[error("car segment has unexpected size or layout: {name}")]
    InvalidLayout {
        /// Car name.
        name: String,
    },

    /// Initializing the in-segment mutex or condition variable failed.
    #[error("failed to initialize segment lock: {0}")]
    LockInit(std::io::Error),

    /// IO error from mapping or metadata access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error.
    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),
}
