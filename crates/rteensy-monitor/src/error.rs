//! Error types for monitor and board operations

use rteensy_core::Capability;
use thiserror::Error;

/// Result type for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors from monitor and board operations
///
/// Protocol-level failures bubble up from the core as
/// [`MonitorError::Core`]; the variants here add the context the core
/// cannot know (which board, which firmware, what limit).
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The board has no interface providing the requested capability
    #[error("board '{board}' does not support {capability} in its current mode")]
    MissingCapability {
        /// Board tag
        board: String,
        /// Capability that was requested
        capability: Capability,
    },

    /// The board model could not be determined, so model-dependent
    /// operations (upload, reset) are unavailable
    #[error("cannot determine the model of board '{0}'")]
    UnknownModel(String),

    /// Firmware exceeds the model's program flash
    #[error("firmware '{firmware}' is too big for {model} ({size} > {max} bytes)")]
    FirmwareTooBig {
        /// Firmware name
        firmware: String,
        /// Target model name
        model: &'static str,
        /// Image size in bytes
        size: usize,
        /// Usable flash in bytes
        max: usize,
    },

    /// The signature scan found no known model in the image
    #[error("firmware '{0}' was not compiled for a known board")]
    UnknownFirmware(String),

    /// The signature scan identified a different model
    #[error("firmware '{firmware}' was compiled for {model}")]
    WrongFirmware {
        /// Firmware name
        firmware: String,
        /// Best-guess model the firmware was built for
        model: &'static str,
    },

    /// Support for this model is experimental and not enabled
    #[error(
        "support for {0} boards is experimental, set TY_EXPERIMENTAL_BOARDS \
         to any value to enable it"
    )]
    ExperimentalModel(&'static str),

    /// The board was dropped while an operation was waiting on it
    #[error("board '{0}' has disappeared")]
    BoardGone(String),

    /// A registered callback failed
    #[error("monitor callback failed: {0}")]
    Callback(String),

    /// Protocol or platform failure reported by the core
    #[error(transparent)]
    Core(#[from] rteensy_core::Error),
}
