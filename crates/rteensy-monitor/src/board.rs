//! Board records
//!
//! A board aggregates the interfaces observed at one USB location into
//! a single logical device. The monitor owns boards through `Arc`;
//! callers may keep extra references, which stay valid (and readable)
//! after the board is dropped from the monitor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rteensy_core::device::Clock;
use rteensy_core::firmware::Firmware;
use rteensy_core::halfkay::ProgressFn;
use rteensy_core::model::{Family, Model};
use rteensy_core::{Capabilities, Capability};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::iface::Interface;
use crate::platform::Platform;

/// Lifecycle state of a board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardStatus {
    /// At least one interface is present
    Online,
    /// All interfaces disappeared; the grace period is running
    Missing,
    /// The grace period expired; the monitor released the board
    Dropped,
}

/// Monitor event delivered to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A new board appeared
    Added,
    /// An existing board gained or lost interfaces, or its identity
    /// details changed
    Changed,
    /// All interfaces of a board disappeared
    Disappeared,
    /// A missing board's grace period expired
    Dropped,
}

/// Options for [`Board::upload`]
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Verify with the signature scanner that the firmware was built
    /// for the target model
    pub check_firmware: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            check_firmware: true,
        }
    }
}

// Poisoning is ignored; guarded sections only do plain field updates.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct BoardState<P: Platform> {
    pub(crate) model: &'static Model,
    pub(crate) serial: u64,
    pub(crate) description: String,
    pub(crate) vid: u16,
    pub(crate) pid: u16,
    pub(crate) status: BoardStatus,
    pub(crate) missing_since: u64,
    pub(crate) interfaces: Vec<Arc<Mutex<Interface<P>>>>,
    pub(crate) cap2iface: [Option<usize>; Capability::COUNT],
    pub(crate) capabilities: Capabilities,
}

/// A logical development board
pub struct Board<P: Platform> {
    location: String,
    id: String,
    family: Family,
    config: Arc<MonitorConfig>,
    state: Mutex<BoardState<P>>,
}

impl<P: Platform> Board<P> {
    pub(crate) fn new(
        dev: &P::Device,
        iface: &Interface<P>,
        config: Arc<MonitorConfig>,
    ) -> Self {
        use rteensy_core::device::UsbDevice;

        let family = iface.family();
        let id = format!("{}-{}", iface.serial(), family.name());

        Self {
            location: dev.location().to_string(),
            id,
            family,
            config,
            state: Mutex::new(BoardState {
                model: iface.model(),
                serial: iface.serial(),
                description: String::new(),
                vid: dev.vid(),
                pid: dev.pid(),
                status: BoardStatus::Online,
                missing_since: 0,
                interfaces: Vec::new(),
                cap2iface: [None; Capability::COUNT],
                capabilities: Capabilities::empty(),
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, BoardState<P>> {
        lock(&self.state)
    }

    /// Stable USB location the board was observed at
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Board identifier, `"<serial>-<family>"`. Fixed at creation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Board tag (currently an alias of [`Board::id`])
    pub fn tag(&self) -> &str {
        &self.id
    }

    /// Family the board belongs to
    pub fn family(&self) -> Family {
        self.family
    }

    /// Current model (the family placeholder until an interface
    /// identifies the real one)
    pub fn model(&self) -> &'static Model {
        self.state().model
    }

    /// Serial number (0 until an interface reports one)
    pub fn serial(&self) -> u64 {
        self.state().serial
    }

    /// Human-readable description derived from the interfaces
    pub fn description(&self) -> String {
        self.state().description.clone()
    }

    /// Most recently observed vendor id
    pub fn vid(&self) -> u16 {
        self.state().vid
    }

    /// Most recently observed product id
    pub fn pid(&self) -> u16 {
        self.state().pid
    }

    /// Current lifecycle state
    pub fn status(&self) -> BoardStatus {
        self.state().status
    }

    /// Union of the capabilities of the current interfaces
    pub fn capabilities(&self) -> Capabilities {
        self.state().capabilities
    }

    /// Whether any current interface provides `capability`
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(capability.mask())
    }

    /// Snapshot of the current interfaces
    pub fn interfaces(&self) -> Vec<Arc<Mutex<Interface<P>>>> {
        self.state().interfaces.clone()
    }

    /// The interface providing `capability`, if any
    pub fn capability_interface(
        &self,
        capability: Capability,
    ) -> Option<Arc<Mutex<Interface<P>>>> {
        let state = self.state();
        let index = state.cap2iface[capability.index()]?;
        state.interfaces.get(index).cloned()
    }

    fn require_capability(&self, capability: Capability) -> Result<Arc<Mutex<Interface<P>>>> {
        self.capability_interface(capability)
            .ok_or_else(|| MonitorError::MissingCapability {
                board: self.id.clone(),
                capability,
            })
    }

    /// Read from the board's serial interface
    pub fn serial_read(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        let iface = self.require_capability(Capability::Serial)?;
        let r = lock(&iface).serial_read(buf, timeout_ms)?;
        Ok(r)
    }

    /// Write to the board's serial interface
    pub fn serial_write(&self, buf: &[u8]) -> Result<usize> {
        let iface = self.require_capability(Capability::Serial)?;
        let r = lock(&iface).serial_write(buf)?;
        Ok(r)
    }

    /// Upload a firmware image through the bootloader interface.
    ///
    /// Checks the image against the model's flash size and, unless
    /// disabled in `options`, against the firmware signature scanner
    /// before any byte goes out.
    pub fn upload<C: Clock>(
        &self,
        clock: &C,
        firmware: &Firmware,
        options: &UploadOptions,
        progress: &mut ProgressFn<'_>,
    ) -> Result<()> {
        let iface = self.require_capability(Capability::Upload)?;
        let model = self.model();

        if !model.is_real() {
            return Err(MonitorError::UnknownModel(self.id.clone()));
        }
        if model.experimental && !self.config.experimental_boards {
            return Err(MonitorError::ExperimentalModel(model.name));
        }
        if firmware.size() > model.code_size as usize {
            return Err(MonitorError::FirmwareTooBig {
                firmware: firmware.name().to_string(),
                model: model.name,
                size: firmware.size(),
                max: model.code_size as usize,
            });
        }

        if options.check_firmware {
            let mut guesses = [self.family.unknown_model(); 8];
            let count = self.family.scan_firmware(firmware.image(), &mut guesses);

            if count == 0 {
                return Err(MonitorError::UnknownFirmware(firmware.name().to_string()));
            }
            if !guesses[..count].contains(&model) {
                return Err(MonitorError::WrongFirmware {
                    firmware: firmware.name().to_string(),
                    model: guesses[0].name,
                });
            }
        }

        let result = lock(&iface).upload(
            clock,
            firmware.image(),
            self.config.experimental_boards,
            progress,
        );
        result
    }

    /// Jump from the bootloader into the application
    pub fn reset<C: Clock>(&self, clock: &C) -> Result<()> {
        let iface = self.require_capability(Capability::Reset)?;
        let model = self.model();

        if model.experimental && !self.config.experimental_boards {
            return Err(MonitorError::ExperimentalModel(model.name));
        }

        let result = lock(&iface).reset(clock, self.config.experimental_boards);
        result
    }

    /// Reboot the running application into the bootloader
    pub fn reboot(&self) -> Result<()> {
        let iface = self.require_capability(Capability::Reboot)?;
        let result = lock(&iface).reboot();
        result
    }
}
