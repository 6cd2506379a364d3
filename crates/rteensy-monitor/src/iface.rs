//! Interface records
//!
//! An interface is one USB function contributing capabilities to a
//! board. It is created when classification accepts a device and
//! dropped when the device disconnects or its board is dropped; the
//! device handle opens lazily on first I/O and closes with the record.

use rteensy_core::classify::Role;
use rteensy_core::device::{Clock, DeviceIo, DeviceType, SerialConfig, UsbDevice};
use rteensy_core::halfkay::{self, ProgressFn};
use rteensy_core::model::{Family, Model, FAMILIES};
use rteensy_core::{serialnum, seremu, Capabilities};

use crate::error::Result;
use crate::platform::Platform;

/// A classified USB interface belonging to a board
pub struct Interface<P: Platform> {
    dev: P::Device,
    node: String,
    handle: Option<P::Handle>,
    family: Family,
    role: Role,
    model: &'static Model,
    capabilities: Capabilities,
    serial: u64,
}

impl<P: Platform> Interface<P> {
    /// Run the device through every family classifier; returns the
    /// interface record if one accepts it.
    pub(crate) fn probe(dev: &P::Device) -> Option<Self> {
        for family in FAMILIES.iter().copied() {
            let Some(details) = family.classify_interface(dev) else {
                continue;
            };

            // Bootloader interfaces with an identified model report the
            // serial in hex, everything else in decimal.
            let serial = if details.model.is_real() {
                serialnum::parse_bootloader_serial(dev.serial_number())
            } else {
                serialnum::parse_runtime_serial(dev.serial_number())
            };

            let mut capabilities = details.capabilities;
            if serialnum::is_unique_serial(serial) {
                capabilities |= Capabilities::UNIQUE;
            }

            return Some(Self {
                dev: dev.clone(),
                node: dev.node().to_string(),
                handle: None,
                family,
                role: details.role,
                model: details.model,
                capabilities,
                serial,
            });
        }

        None
    }

    /// Unique device node this interface was created from
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The underlying platform device
    pub fn device(&self) -> &P::Device {
        &self.dev
    }

    /// Role of this interface on its board
    pub fn role(&self) -> Role {
        self.role
    }

    /// Interface display name
    pub fn name(&self) -> &'static str {
        self.role.name()
    }

    /// Owning family
    pub fn family(&self) -> Family {
        self.family
    }

    /// Model identified from this interface (may be the placeholder)
    pub fn model(&self) -> &'static Model {
        self.model
    }

    /// Capabilities contributed by this interface
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Serial number parsed from the device descriptor (0 if absent)
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Drop the open handle, if any
    pub fn close(&mut self) {
        self.handle = None;
    }

    fn ensure_open(&mut self) -> Result<&mut P::Handle> {
        if self.handle.is_none() {
            let mut handle = self.dev.open()?;

            // Some hosts keep tty settings across opens; if the magic
            // reboot baudrate stays cached the device reboots on every
            // open, so put 115200 back right away.
            if self.dev.device_type() == DeviceType::Serial {
                let _ = handle.serial_set_config(&SerialConfig::default());
            }

            self.handle = Some(handle);
        }

        Ok(self.handle.as_mut().expect("handle was just opened"))
    }

    /// Read serial data (CDC or SEREMU, depending on the function)
    pub fn serial_read(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        let device_type = self.dev.device_type();
        let handle = self.ensure_open()?;

        let r = match device_type {
            DeviceType::Serial => handle.serial_read(buf, timeout_ms)?,
            DeviceType::Hid => seremu::read(handle, buf, timeout_ms)?,
        };
        Ok(r)
    }

    /// Write serial data (CDC or SEREMU, depending on the function)
    pub fn serial_write(&mut self, buf: &[u8]) -> Result<usize> {
        let device_type = self.dev.device_type();
        let handle = self.ensure_open()?;

        let r = match device_type {
            DeviceType::Serial => handle.serial_write(buf)?,
            DeviceType::Hid => seremu::write(handle, buf)?,
        };
        Ok(r)
    }

    /// Stream a firmware image to the bootloader behind this interface
    pub fn upload<C: Clock>(
        &mut self,
        clock: &C,
        image: &[u8],
        allow_experimental: bool,
        progress: &mut ProgressFn<'_>,
    ) -> Result<()> {
        let model = self.model;
        let handle = self.ensure_open()?;
        halfkay::upload(handle, clock, model, image, allow_experimental, progress)?;
        Ok(())
    }

    /// Make the bootloader jump into the application
    pub fn reset<C: Clock>(&mut self, clock: &C, allow_experimental: bool) -> Result<()> {
        let model = self.model;
        let handle = self.ensure_open()?;
        halfkay::reset(handle, clock, model, allow_experimental)?;
        Ok(())
    }

    /// Reboot the running application into the bootloader
    pub fn reboot(&mut self) -> Result<()> {
        let device_type = self.dev.device_type();
        let handle = self.ensure_open()?;
        halfkay::reboot(handle, device_type)?;
        Ok(())
    }
}
