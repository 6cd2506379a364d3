//! rteensy-core - Core library for Teensy board management
//!
//! This crate provides the hardware-independent half of the rteensy
//! toolkit: board model identification, USB interface classification,
//! serial-number parsing, the HalfKay bootloader protocol, SEREMU
//! framing, and firmware signature scanning. It is designed to be
//! `no_std` compatible; the I/O it performs goes through the traits in
//! [`device`], which the platform layer implements.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation for owned firmware images
//!
//! # Example
//!
//! ```ignore
//! use rteensy_core::{classify, device::UsbDevice, model::Family};
//!
//! fn inspect<D: UsbDevice>(dev: &D) {
//!     if let Some(details) = Family::Teensy.classify_interface(dev) {
//!         println!("{} interface on {}", details.role.name(), details.model.name);
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod caps;
pub mod classify;
pub mod device;
pub mod error;
pub mod firmware;
pub mod halfkay;
pub mod model;
pub mod serialnum;
pub mod seremu;

pub use caps::{Capabilities, Capability};
pub use error::{Error, Result};
pub use model::{Family, Model};
