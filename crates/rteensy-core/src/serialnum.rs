//! Serial number parsing
//!
//! Teensy boards report serial numbers in two formats depending on
//! mode, with a pair of long-lived firmware quirks layered on top.

/// Serial value reported by AVR boards, whose bootloader has no real
/// serial number. Boards carrying it cannot be told apart.
pub const AVR_PLACEHOLDER_SERIAL: u64 = 12345;

/// Parse the longest valid prefix of `s` in the given radix, the way
/// `strtoull` does. Device strings are not trusted input; trailing
/// junk is ignored and no digits at all parse as 0.
fn parse_prefix(s: &str, radix: u32) -> u64 {
    let mut value: u64 = 0;
    for c in s.chars() {
        match c.to_digit(radix) {
            Some(d) => value = value.saturating_mul(radix as u64).saturating_add(d as u64),
            None => break,
        }
    }
    value
}

/// Parse a serial number string reported in bootloader (HalfKay) mode.
///
/// The bootloader reports the serial as hexadecimal with leading
/// zeros. Absent strings mean an AVR board ([`AVR_PLACEHOLDER_SERIAL`]).
/// Beta K66 boards without a programmed serial report 00000064 (100),
/// which must be ignored. Values below 10,000,000 get a zero appended,
/// matching the Teensyduino 1.19 workaround for a Mac OS X CDC-ADM
/// driver bug.
pub fn parse_bootloader_serial(s: Option<&str>) -> u64 {
    let s = match s {
        Some(s) if !s.is_empty() => s,
        _ => return AVR_PLACEHOLDER_SERIAL,
    };

    let serial = parse_prefix(s, 16);

    if serial == 100 {
        0
    } else if serial < 10_000_000 {
        serial * 10
    } else {
        serial
    }
}

/// Parse a serial number string reported by a running application.
///
/// Runtime interfaces report the serial in decimal. The same
/// append-a-zero workaround applies below 10,000,000; values already
/// at or above that threshold are never transformed, even if the
/// firmware predates the workaround.
pub fn parse_runtime_serial(s: Option<&str>) -> u64 {
    let s = match s {
        Some(s) if !s.is_empty() => s,
        _ => return 0,
    };

    let serial = parse_prefix(s, 10);

    if serial < 10_000_000 {
        serial * 10
    } else {
        serial
    }
}

/// Whether a parsed serial uniquely identifies a physical board.
///
/// AVR boards always report 12345, and custom ARM boards without a
/// valid MAC address report an all-ones value.
pub fn is_unique_serial(serial: u64) -> bool {
    serial != 0 && serial != AVR_PLACEHOLDER_SERIAL && serial != u32::MAX as u64
}
