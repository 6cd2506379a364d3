//! Board model and family registry
//!
//! Model descriptors are statically defined; there is exactly one
//! family (Teensy) but the registry keeps the family seam explicit so
//! classification, firmware scanning and board identity all dispatch
//! through it.

use crate::halfkay::HalfKayVersion;

/// A specific board variant
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(serde::Serialize))]
pub struct Model {
    /// Display name (e.g. "Teensy 3.2")
    pub name: &'static str,
    /// Chip identifier (e.g. "mk20dx256")
    pub mcu: &'static str,
    /// Program flash available to firmware, in bytes (0 for the
    /// unknown placeholder)
    pub code_size: u32,
    /// HalfKay protocol version spoken by the bootloader
    pub halfkay: Option<HalfKayVersion>,
    /// Upload block size in bytes
    pub block_size: usize,
    /// HID usage id reported in bootloader mode, distinguishes models
    pub usage: u16,
    /// Support for this model is experimental and gated behind
    /// configuration
    pub experimental: bool,
}

impl Model {
    /// Whether this descriptor identifies an actual model, as opposed
    /// to the family's unknown placeholder
    pub fn is_real(&self) -> bool {
        self.code_size != 0
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other)
    }
}

impl Eq for Model {}

/// Placeholder used when an interface belongs to the family but the
/// exact model cannot be determined. Never valid for upload.
pub static TEENSY_UNKNOWN: Model = Model {
    name: "Teensy",
    mcu: "",
    code_size: 0,
    halfkay: None,
    block_size: 0,
    usage: 0,
    experimental: false,
};

pub(crate) static TEENSY_PP10: Model = Model {
    name: "Teensy++ 1.0",
    mcu: "at90usb646",
    code_size: 64_512,
    halfkay: Some(HalfKayVersion::V1),
    block_size: 256,
    usage: 0x1A,
    experimental: true,
};

pub(crate) static TEENSY_20: Model = Model {
    name: "Teensy 2.0",
    mcu: "atmega32u4",
    code_size: 32_256,
    halfkay: Some(HalfKayVersion::V1),
    block_size: 128,
    usage: 0x1B,
    experimental: true,
};

pub(crate) static TEENSY_PP20: Model = Model {
    name: "Teensy++ 2.0",
    mcu: "at90usb1286",
    code_size: 130_048,
    halfkay: Some(HalfKayVersion::V2),
    block_size: 256,
    usage: 0x1C,
    experimental: false,
};

pub(crate) static TEENSY_30: Model = Model {
    name: "Teensy 3.0",
    mcu: "mk20dx128",
    code_size: 131_072,
    halfkay: Some(HalfKayVersion::V3),
    block_size: 1024,
    usage: 0x1D,
    experimental: false,
};

pub(crate) static TEENSY_31: Model = Model {
    name: "Teensy 3.1",
    mcu: "mk20dx256",
    code_size: 262_144,
    halfkay: Some(HalfKayVersion::V3),
    block_size: 1024,
    usage: 0x1E,
    experimental: false,
};

pub(crate) static TEENSY_LC: Model = Model {
    name: "Teensy LC",
    mcu: "mkl26z64",
    code_size: 63_488,
    halfkay: Some(HalfKayVersion::V3),
    block_size: 512,
    usage: 0x20,
    experimental: false,
};

pub(crate) static TEENSY_32: Model = Model {
    name: "Teensy 3.2",
    mcu: "mk20dx256",
    code_size: 262_144,
    halfkay: Some(HalfKayVersion::V3),
    block_size: 1024,
    usage: 0x21,
    experimental: false,
};

pub(crate) static TEENSY_34: Model = Model {
    name: "Teensy 3.4",
    mcu: "mk64fx512",
    code_size: 524_288,
    halfkay: Some(HalfKayVersion::V3),
    block_size: 1024,
    usage: 0x23,
    experimental: false,
};

pub(crate) static TEENSY_35: Model = Model {
    name: "Teensy 3.5",
    mcu: "mk66fx1m0",
    code_size: 1_048_576,
    halfkay: Some(HalfKayVersion::V3),
    block_size: 1024,
    usage: 0x22,
    experimental: false,
};

static TEENSY_MODELS: [&Model; 9] = [
    &TEENSY_PP10,
    &TEENSY_20,
    &TEENSY_PP20,
    &TEENSY_30,
    &TEENSY_31,
    &TEENSY_LC,
    &TEENSY_32,
    &TEENSY_34,
    &TEENSY_35,
];

/// A product line sharing identification, upload and firmware-scan
/// logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize))]
pub enum Family {
    /// PJRC Teensy boards (HalfKay bootloader)
    Teensy,
}

/// All supported families, in classification order
pub static FAMILIES: [Family; 1] = [Family::Teensy];

impl Family {
    /// Family display name, used in board identifiers
    pub fn name(self) -> &'static str {
        match self {
            Family::Teensy => "Teensy",
        }
    }

    /// Real models of this family, in registry order
    pub fn models(self) -> &'static [&'static Model] {
        match self {
            Family::Teensy => &TEENSY_MODELS,
        }
    }

    /// Placeholder model for interfaces that belong to the family but
    /// cannot be narrowed down further
    pub fn unknown_model(self) -> &'static Model {
        match self {
            Family::Teensy => &TEENSY_UNKNOWN,
        }
    }

    /// Identify a model from the HID usage id reported by the
    /// bootloader
    pub fn identify_model(self, usage: u16) -> Option<&'static Model> {
        for model in self.models() {
            if model.usage == usage {
                log::debug!("Identified '{}' with usage value 0x{:x}", model.name, usage);
                return Some(model);
            }
        }

        log::debug!("Unknown {} model with usage value 0x{:x}", self.name(), usage);
        None
    }

    /// Find a model by display name or MCU identifier
    pub fn find_model(self, name: &str) -> Option<&'static Model> {
        self.models()
            .iter()
            .find(|m| m.name == name || m.mcu == name)
            .copied()
    }
}
