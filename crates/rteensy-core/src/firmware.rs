//! Firmware images and model signature scanning
//!
//! Compiled Teensy firmware embeds a few instruction sequences that are
//! stable enough per model to act as signatures. Scanning for them lets
//! the upload path refuse images built for a different board.

use crate::model::{self, Family, Model};

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};

struct Signature {
    magic: u64,
    model: &'static Model,
    priority: u32,
}

// Several ARM models share startup code, so their magics collide
// (Teensy 3.1/3.2); the priority field lets a more specific signature
// override the generic ones.
static TEENSY_SIGNATURES: [Signature; 9] = [
    Signature {
        magic: 0x0C94_007E_FFCF_F894,
        model: &model::TEENSY_PP10,
        priority: 0,
    },
    Signature {
        magic: 0x0C94_003F_FFCF_F894,
        model: &model::TEENSY_20,
        priority: 0,
    },
    Signature {
        magic: 0x0C94_00FE_FFCF_F894,
        model: &model::TEENSY_PP20,
        priority: 0,
    },
    Signature {
        magic: 0x3880_0440_823F_0400,
        model: &model::TEENSY_30,
        priority: 0,
    },
    Signature {
        magic: 0x3080_0440_823F_0400,
        model: &model::TEENSY_31,
        priority: 0,
    },
    Signature {
        magic: 0x3480_0440_823F_0000,
        model: &model::TEENSY_LC,
        priority: 0,
    },
    Signature {
        magic: 0x3080_0440_823F_0400,
        model: &model::TEENSY_32,
        priority: 0,
    },
    Signature {
        magic: 0x0100_002B_88ED_00E0,
        model: &model::TEENSY_34,
        priority: 1,
    },
    Signature {
        magic: 0x0020_08E0_0300_0085,
        model: &model::TEENSY_35,
        priority: 2,
    },
];

impl Family {
    /// Scan a firmware image for model signatures.
    ///
    /// Fills `guesses` with candidate models in discovery order and
    /// returns how many were written. Only candidates of the highest
    /// priority seen survive; a later high-priority hit clears earlier
    /// guesses, so the scan never stops early even once `guesses` is
    /// full.
    pub fn scan_firmware(self, image: &[u8], guesses: &mut [&'static Model]) -> usize {
        let signatures = match self {
            Family::Teensy => &TEENSY_SIGNATURES,
        };

        if image.len() < 8 {
            return 0;
        }

        let mut priority = 0;
        let mut count = 0;

        // Naive search with each model's signature; good enough unless
        // thousands of models appear.
        for window in image.windows(8) {
            let value = u64::from_be_bytes(window.try_into().unwrap());

            for sig in signatures {
                if value == sig.magic && sig.priority >= priority {
                    if sig.priority > priority {
                        priority = sig.priority;
                        count = 0;
                    }

                    if count < guesses.len() {
                        guesses[count] = sig.model;
                        count += 1;
                    }
                }
            }
        }

        count
    }
}

/// A parsed firmware image ready for upload
///
/// Producing the image from a file format (IHEX, ELF) is the firmware
/// parser's job; this type only carries the result.
#[cfg(feature = "alloc")]
#[derive(Debug, Clone)]
pub struct Firmware {
    name: String,
    image: Vec<u8>,
}

#[cfg(feature = "alloc")]
impl Firmware {
    /// Wrap a flat binary image
    pub fn new(name: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    /// Display name of the firmware (usually the source file name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flat image bytes, offset 0 first
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Image size in bytes
    pub fn size(&self) -> usize {
        self.image.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    const TEENSY_30_SIG: [u8; 8] = [0x38, 0x80, 0x04, 0x40, 0x82, 0x3F, 0x04, 0x00];
    const TEENSY_31_32_SIG: [u8; 8] = [0x30, 0x80, 0x04, 0x40, 0x82, 0x3F, 0x04, 0x00];
    const TEENSY_35_SIG: [u8; 8] = [0x00, 0x20, 0x08, 0xE0, 0x03, 0x00, 0x00, 0x85];

    fn scan(image: &[u8]) -> Vec<&'static str> {
        let mut guesses = [Family::Teensy.unknown_model(); 4];
        let count = Family::Teensy.scan_firmware(image, &mut guesses);
        guesses[..count].iter().map(|m| m.name).collect()
    }

    #[test]
    fn test_scan_tiny_image_is_empty() {
        assert!(scan(&[]).is_empty());
        assert!(scan(&TEENSY_30_SIG[..7]).is_empty());
    }

    #[test]
    fn test_scan_finds_signature_at_any_offset() {
        // exactly one window
        assert_eq!(scan(&TEENSY_30_SIG), &["Teensy 3.0"]);

        let mut image = std::vec![0u8; 64];
        image[13..21].copy_from_slice(&TEENSY_30_SIG);
        assert_eq!(scan(&image), &["Teensy 3.0"]);

        // signature flush against the end of the image
        let mut image = std::vec![0u8; 32];
        image[24..].copy_from_slice(&TEENSY_30_SIG);
        assert_eq!(scan(&image), &["Teensy 3.0"]);
    }

    #[test]
    fn test_scan_ambiguous_signature_lists_both_models() {
        assert_eq!(scan(&TEENSY_31_32_SIG), &["Teensy 3.1", "Teensy 3.2"]);
    }

    #[test]
    fn test_scan_higher_priority_replaces_earlier_guesses() {
        let mut image = Vec::new();
        image.extend_from_slice(&TEENSY_31_32_SIG);
        image.extend_from_slice(&[0u8; 16]);
        image.extend_from_slice(&TEENSY_35_SIG);
        assert_eq!(scan(&image), &["Teensy 3.5"]);

        // order must not matter
        let mut image = Vec::new();
        image.extend_from_slice(&TEENSY_35_SIG);
        image.extend_from_slice(&[0u8; 16]);
        image.extend_from_slice(&TEENSY_31_32_SIG);
        assert_eq!(scan(&image), &["Teensy 3.5"]);
    }

    #[test]
    fn test_scan_respects_guess_buffer_capacity() {
        let mut image = Vec::new();
        for _ in 0..3 {
            image.extend_from_slice(&TEENSY_31_32_SIG);
            image.extend_from_slice(&[0u8; 8]);
        }

        let mut guesses = [Family::Teensy.unknown_model(); 2];
        let count = Family::Teensy.scan_firmware(&image, &mut guesses);
        assert_eq!(count, 2);
        assert_eq!(guesses[0].name, "Teensy 3.1");
        assert_eq!(guesses[1].name, "Teensy 3.2");
    }

    #[test]
    fn test_scan_full_buffer_still_yields_to_priority() {
        // fill the buffer with low-priority hits, then one priority-2 hit
        let mut image = Vec::new();
        for _ in 0..4 {
            image.extend_from_slice(&TEENSY_31_32_SIG);
            image.extend_from_slice(&[0u8; 8]);
        }
        image.extend_from_slice(&TEENSY_35_SIG);

        let mut guesses = [Family::Teensy.unknown_model(); 2];
        let count = Family::Teensy.scan_firmware(&image, &mut guesses);
        assert_eq!(count, 1);
        assert_eq!(guesses[0].name, "Teensy 3.5");
    }

    #[test]
    fn test_firmware_container() {
        let fw = Firmware::new("blink.hex", std::vec![1, 2, 3]);
        assert_eq!(fw.name(), "blink.hex");
        assert_eq!(fw.size(), 3);
        assert_eq!(fw.image(), &[1, 2, 3]);
    }
}
