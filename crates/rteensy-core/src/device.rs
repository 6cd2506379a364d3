//! Platform device contracts
//!
//! The core never talks to the operating system directly. Enumeration,
//! descriptor access and blocking I/O are provided by the platform
//! layer through the traits below, which keeps the protocol engines
//! testable against recorded mocks.

use crate::error::Result;

/// USB function type of a device node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceType {
    /// CDC-ACM serial function
    Serial,
    /// HID function
    Hid,
}

/// Serial line configuration
///
/// Only the baudrate matters to this crate; platform implementations
/// may map the rest of the line settings to sane fixed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baudrate: 115_200 }
    }
}

/// An enumerated USB device function (one endpoint set)
///
/// Accessors are pure; nothing is opened until [`UsbDevice::open`] is
/// called. `node` must be unique per device function for the lifetime
/// of the connection (a device path), while `location` identifies the
/// physical port and is shared by all functions of a composite device.
pub trait UsbDevice {
    /// Handle type produced by [`UsbDevice::open`]
    type Handle: DeviceIo;

    /// Unique identifier of this device function (e.g. a devnode path)
    fn node(&self) -> &str;

    /// Stable physical location of the device (USB port path)
    fn location(&self) -> &str;

    /// USB vendor id
    fn vid(&self) -> u16;

    /// USB product id
    fn pid(&self) -> u16;

    /// Function type (serial or HID)
    fn device_type(&self) -> DeviceType;

    /// USB serial number string, if the descriptor carries one
    fn serial_number(&self) -> Option<&str>;

    /// USB product string, if the descriptor carries one
    fn product(&self) -> Option<&str>;

    /// HID usage page (meaningful for HID functions only)
    fn hid_usage_page(&self) -> u16;

    /// HID usage id (meaningful for HID functions only)
    fn hid_usage(&self) -> u16;

    /// Open the device for I/O
    fn open(&self) -> Result<Self::Handle>;
}

/// Blocking I/O operations on an open device handle
pub trait DeviceIo {
    /// Read from a serial function, waiting at most `timeout_ms`
    /// (negative means block indefinitely). Returns bytes read.
    fn serial_read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;

    /// Write to a serial function. Returns bytes written.
    fn serial_write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Change serial line settings
    fn serial_set_config(&mut self, config: &SerialConfig) -> Result<()>;

    /// Read an input report from a HID function, waiting at most
    /// `timeout_ms` (negative means block indefinitely)
    fn hid_read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;

    /// Write an output report to a HID function
    fn hid_write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Send a feature report to a HID function
    fn hid_send_feature_report(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Millisecond clock and sleep, provided by the platform
///
/// The HalfKay engine uses this for retry deadlines and erase pacing;
/// tests substitute a manual clock.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin
    fn now_ms(&self) -> u64;

    /// Block the calling thread for `ms` milliseconds
    fn sleep_ms(&self, ms: u64);
}
