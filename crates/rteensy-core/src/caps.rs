//! Board capability flags

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Capability flags aggregated over a board's interfaces
    ///
    /// Each interface contributes a subset of these; a board's
    /// capability set is the union over its current interfaces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "std", serde(transparent))]
    pub struct Capabilities: u32 {
        /// A user application is running on the board
        const RUN    = 1 << 0;
        /// Firmware upload through the HalfKay bootloader
        const UPLOAD = 1 << 1;
        /// Reset (jump out of the bootloader into the application)
        const RESET  = 1 << 2;
        /// Reboot the running application into the bootloader
        const REBOOT = 1 << 3;
        /// Serial transfer (CDC or SEREMU emulation)
        const SERIAL = 1 << 4;
        /// The board carries a usable unique serial number
        const UNIQUE = 1 << 5;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::empty()
    }
}

/// Indexable form of a single capability bit
///
/// Used for the per-capability provider table on boards, which records
/// which interface exposes each capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum Capability {
    /// See [`Capabilities::RUN`]
    Run,
    /// See [`Capabilities::UPLOAD`]
    Upload,
    /// See [`Capabilities::RESET`]
    Reset,
    /// See [`Capabilities::REBOOT`]
    Reboot,
    /// See [`Capabilities::SERIAL`]
    Serial,
    /// See [`Capabilities::UNIQUE`]
    Unique,
}

impl Capability {
    /// Number of distinct capabilities
    pub const COUNT: usize = 6;

    /// All capabilities, in bit order
    pub const ALL: [Capability; Self::COUNT] = [
        Capability::Run,
        Capability::Upload,
        Capability::Reset,
        Capability::Reboot,
        Capability::Serial,
        Capability::Unique,
    ];

    /// Bit index of this capability
    pub fn index(self) -> usize {
        match self {
            Capability::Run => 0,
            Capability::Upload => 1,
            Capability::Reset => 2,
            Capability::Reboot => 3,
            Capability::Serial => 4,
            Capability::Unique => 5,
        }
    }

    /// Single-bit mask for this capability
    pub fn mask(self) -> Capabilities {
        Capabilities::from_bits_truncate(1 << self.index())
    }

    /// Human-readable capability name
    pub fn name(self) -> &'static str {
        match self {
            Capability::Run => "run",
            Capability::Upload => "upload",
            Capability::Reset => "reset",
            Capability::Reboot => "reboot",
            Capability::Serial => "serial",
            Capability::Unique => "unique",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
