//! Platform adapter contract
//!
//! The monitor consumes USB hotplug enumeration, readiness descriptors,
//! one-shot timers and a clock through the traits below. Device-level
//! contracts (descriptor accessors, blocking I/O) live in
//! [`rteensy_core::device`]; this module adds the event plumbing that
//! only makes sense with an operating system underneath.

use std::thread;
use std::time::Instant;

pub use rteensy_core::device::{Clock, DeviceIo, DeviceType, SerialConfig, UsbDevice};

/// A pollable readiness descriptor (a file descriptor on Unix hosts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub i32);

/// A set of descriptors to poll, each labeled with a caller tag
#[derive(Debug, Default)]
pub struct DescriptorSet {
    entries: Vec<(Descriptor, i32)>,
}

impl DescriptorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor with a caller-chosen tag
    pub fn add(&mut self, descriptor: Descriptor, tag: i32) {
        self.entries.push((descriptor, tag));
    }

    /// Number of descriptors in the set
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(descriptor, tag)` entries
    pub fn iter(&self) -> impl Iterator<Item = (Descriptor, i32)> + '_ {
        self.entries.iter().copied()
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Connection status reported for a device by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The device is present and usable
    Online,
    /// The device has been disconnected
    Disconnected,
}

/// A one-shot timer integrated with the poll loop
pub trait Timer {
    /// Arm the timer to fire once after `timeout_ms`; `None` disarms it
    fn set(&mut self, timeout_ms: Option<u64>) -> rteensy_core::Result<()>;

    /// Consume the fired state, returning whether the timer fired
    /// since the last call
    fn rearm(&mut self) -> bool;

    /// Descriptor that becomes readable when the timer fires
    fn descriptor(&self) -> Descriptor;
}

/// USB hotplug platform consumed by the monitor
///
/// `list` reports every currently-present device once; `refresh`
/// reports status changes since the previous call. Both stop early
/// when the callback returns `true`.
pub trait Platform: Clock {
    /// Enumerated device type
    type Device: UsbDevice<Handle = Self::Handle> + Clone;
    /// Open device handle type
    type Handle: DeviceIo;
    /// Timer type
    type Timer: Timer;

    /// Create a one-shot timer
    fn new_timer(&mut self) -> rteensy_core::Result<Self::Timer>;

    /// Descriptor that becomes readable when device status changes
    fn descriptor(&self) -> Descriptor;

    /// Report all present devices as online
    fn list(
        &mut self,
        callback: &mut dyn FnMut(&Self::Device, DeviceStatus) -> bool,
    ) -> rteensy_core::Result<()>;

    /// Report device status changes since the last call
    fn refresh(
        &mut self,
        callback: &mut dyn FnMut(&Self::Device, DeviceStatus) -> bool,
    ) -> rteensy_core::Result<()>;

    /// Wait until a descriptor in `set` becomes readable or the
    /// timeout elapses (negative means block indefinitely). Returns
    /// the number of readable descriptors, 0 on timeout.
    fn poll(&mut self, set: &DescriptorSet, timeout_ms: i32) -> rteensy_core::Result<u32>;
}

/// Clamp a timeout to the time remaining since `start_ms`.
///
/// Returns 0 once the timeout has elapsed; a negative `timeout_ms`
/// means "infinite" and passes through as -1.
pub fn adjust_timeout(timeout_ms: i32, start_ms: u64, now_ms: u64) -> i32 {
    if timeout_ms < 0 {
        return -1;
    }

    let elapsed = now_ms.saturating_sub(start_ms);
    if elapsed >= timeout_ms as u64 {
        0
    } else {
        (timeout_ms as u64 - elapsed) as i32
    }
}

/// Wall-clock [`Clock`] backed by the standard library
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl SystemClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        thread::sleep(std::time::Duration::from_millis(ms));
    }
}
