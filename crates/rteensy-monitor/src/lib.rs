//! rteensy-monitor - Hotplug monitor and board lifecycle for Teensy
//! devices
//!
//! This crate turns raw USB hotplug notifications into a stable view
//! of logical boards: interfaces are classified, aggregated by
//! location, and reported through ADDED / CHANGED / DISAPPEARED /
//! DROPPED events. Board handles expose firmware upload, reset,
//! bootloader reboot and serial I/O, implemented on top of
//! [`rteensy_core`].
//!
//! The operating system surface (USB enumeration, poll, timers) is
//! consumed through the [`platform::Platform`] trait; this crate ships
//! no backend of its own.
//!
//! # Example
//!
//! ```ignore
//! use rteensy_monitor::{CallbackAction, Event, Monitor, MonitorFlags};
//!
//! fn watch(platform: impl rteensy_monitor::Platform) -> rteensy_monitor::Result<()> {
//!     let mut monitor = Monitor::new(platform, MonitorFlags::empty())?;
//!     monitor.register_callback(|board, event| {
//!         println!("{:?}: {} ({})", event, board.tag(), board.description());
//!         Ok(CallbackAction::Keep)
//!     });
//!     loop {
//!         monitor.wait(|_| Ok(false), 1000)?;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod board;
pub mod config;
pub mod error;
pub mod iface;
pub mod monitor;
pub mod platform;

#[cfg(test)]
pub(crate) mod mock;

pub use board::{Board, BoardStatus, Event, UploadOptions};
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use iface::Interface;
pub use monitor::{CallbackAction, Monitor, MonitorFlags, RefreshSignal};
pub use platform::{
    adjust_timeout, Descriptor, DescriptorSet, DeviceStatus, Platform, SystemClock, Timer,
};

pub use rteensy_core;
