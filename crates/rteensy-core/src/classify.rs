//! USB interface classification
//!
//! Decides whether an enumerated device function belongs to a board
//! family, which role it plays, and what it contributes to the board.
//! Classification is pure descriptor inspection; nothing is opened.

use crate::caps::Capabilities;
use crate::device::{DeviceType, UsbDevice};
use crate::model::{Family, Model};

/// USB vendor id shared by all Teensy functions
pub const TEENSY_VID: u16 = 0x16C0;

const TEENSY_USAGE_PAGE_BOOTLOADER: u16 = 0xFF9C;
const TEENSY_USAGE_PAGE_RAWHID: u16 = 0xFFAB;
const TEENSY_USAGE_PAGE_SEREMU: u16 = 0xFFC9;

/// Role an interface plays on its board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize))]
pub enum Role {
    /// CDC serial function of a running application
    Serial,
    /// HalfKay bootloader HID function
    HalfKay,
    /// Raw HID function of a running application
    RawHid,
    /// Serial emulation over HID
    Seremu,
}

impl Role {
    /// Interface display name
    pub fn name(self) -> &'static str {
        match self {
            Role::Serial => "Serial",
            Role::HalfKay => "HalfKay",
            Role::RawHid => "RawHID",
            Role::Seremu => "Seremu",
        }
    }
}

/// Classification output for an accepted interface
#[derive(Debug, Clone, Copy)]
pub struct InterfaceDetails {
    /// Role of the interface on its board
    pub role: Role,
    /// Model identified from the interface, or the family placeholder
    pub model: &'static Model,
    /// Capabilities this interface contributes
    pub capabilities: Capabilities,
}

impl Family {
    /// Classify a device function.
    ///
    /// Returns `None` if the device does not belong to this family.
    /// The UNIQUE capability is not decided here; it depends on the
    /// parsed serial number and is added by the interface record.
    pub fn classify_interface<D: UsbDevice>(self, dev: &D) -> Option<InterfaceDetails> {
        match self {
            Family::Teensy => classify_teensy(dev),
        }
    }
}

fn classify_teensy<D: UsbDevice>(dev: &D) -> Option<InterfaceDetails> {
    if dev.vid() != TEENSY_VID {
        return None;
    }

    match dev.pid() {
        0x478 | 0x482..=0x488 => {}
        _ => return None,
    }

    let mut model = None;
    let (role, capabilities) = match dev.device_type() {
        DeviceType::Serial => (
            Role::Serial,
            Capabilities::RUN | Capabilities::SERIAL | Capabilities::REBOOT,
        ),
        DeviceType::Hid => match dev.hid_usage_page() {
            TEENSY_USAGE_PAGE_BOOTLOADER => {
                model = Family::Teensy.identify_model(dev.hid_usage());
                let caps = if model.is_some() {
                    Capabilities::UPLOAD | Capabilities::RESET
                } else {
                    Capabilities::empty()
                };
                (Role::HalfKay, caps)
            }
            TEENSY_USAGE_PAGE_RAWHID => (Role::RawHid, Capabilities::RUN),
            TEENSY_USAGE_PAGE_SEREMU => (
                Role::Seremu,
                Capabilities::RUN | Capabilities::SERIAL | Capabilities::REBOOT,
            ),
            _ => return None,
        },
    };

    Some(InterfaceDetails {
        role,
        model: model.unwrap_or_else(|| Family::Teensy.unknown_model()),
        capabilities,
    })
}
