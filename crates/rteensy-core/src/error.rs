//! Error types for rteensy-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Device I/O failed; inside HalfKay this is retried against a
    /// deadline before being surfaced
    Io,
    /// Device or interface is no longer present
    NotFound,
    /// Permission denied while opening a device
    Access,
    /// Operation is not supported (experimental model without the
    /// enabling configuration, or reboot on a role that lacks it)
    Unsupported,
    /// The requested capability is not exposed by any interface
    Mode,
    /// Firmware exceeds the model's flash size
    Range,
    /// Firmware signature scan failed or does not match the board
    Firmware,
    /// Platform primitive (timer, poll, lock) failure
    System,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "device I/O error"),
            Self::NotFound => write!(f, "device not found"),
            Self::Access => write!(f, "permission denied"),
            Self::Unsupported => write!(f, "operation not supported"),
            Self::Mode => write!(f, "capability not available in this mode"),
            Self::Range => write!(f, "firmware too big for this board"),
            Self::Firmware => write!(f, "firmware does not match this board"),
            Self::System => write!(f, "system error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
