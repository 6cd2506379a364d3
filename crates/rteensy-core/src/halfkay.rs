//! HalfKay bootloader protocol
//!
//! HalfKay accepts block-addressed writes over HID output reports and a
//! jump command at a magic address. Three wire-format generations
//! exist, selected by the board model. The engine below also covers
//! the runtime-to-bootloader reboot triggers, which go through the
//! running application rather than the bootloader itself.

use crate::device::{Clock, DeviceIo, DeviceType, SerialConfig};
use crate::error::{Error, Result};
use crate::model::Model;

/// HalfKay wire-format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize))]
pub enum HalfKayVersion {
    /// AVR boards with 16-bit byte addressing
    V1,
    /// AVR boards above 64KB, address is sent in 256-byte pages
    V2,
    /// ARM boards, 24-bit byte addressing with a 64-byte block header
    V3,
}

/// Jump address that makes the bootloader start the application
pub const RESET_ADDRESS: usize = 0xFF_FFFF;

/// Magic baudrate that reboots a running application into the
/// bootloader when applied to its CDC interface
pub const REBOOT_BAUDRATE: u32 = 134;

/// Feature report that reboots a running application into the
/// bootloader when sent to its SEREMU interface
pub const SEREMU_REBOOT_REPORT: [u8; 5] = [0x00, 0xA9, 0x45, 0xC2, 0x6B];

// Largest wire packet: report id + v3 block header + 1024-byte block.
const MAX_HEADER_SIZE: usize = 64;
const MAX_BLOCK_SIZE: usize = 1024;
const MAX_PACKET_SIZE: usize = 1 + MAX_HEADER_SIZE + MAX_BLOCK_SIZE;

const UPLOAD_SEND_TIMEOUT_MS: u64 = 3000;
const RESET_SEND_TIMEOUT_MS: u64 = 250;
const RETRY_DELAY_MS: u64 = 10;
const ERASE_DELAY_MS: u64 = 200;
const BLOCK_DELAY_MS: u64 = 20;

/// A fully formatted HalfKay write packet
///
/// Packet construction is deterministic given the version, block size,
/// address and payload; the payload is zero-padded to the block size.
pub struct Packet {
    buf: [u8; MAX_PACKET_SIZE],
    len: usize,
}

impl Packet {
    /// Wire bytes of the packet, including the leading HID report id
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Build a write packet for the given protocol version.
///
/// `data` may be shorter than `block_size` (the final block of an
/// image) or empty (the reset command); the remainder is zero-padded.
/// Byte 0 is the HID report id, which is always 0.
pub fn build_packet(
    version: HalfKayVersion,
    block_size: usize,
    addr: usize,
    data: &[u8],
) -> Packet {
    debug_assert!(data.len() <= block_size);
    debug_assert!(block_size <= MAX_BLOCK_SIZE);

    let mut buf = [0u8; MAX_PACKET_SIZE];
    let len = match version {
        HalfKayVersion::V1 => {
            buf[1] = (addr & 0xFF) as u8;
            buf[2] = ((addr >> 8) & 0xFF) as u8;
            buf[3..3 + data.len()].copy_from_slice(data);
            3 + block_size
        }
        HalfKayVersion::V2 => {
            buf[1] = ((addr >> 8) & 0xFF) as u8;
            buf[2] = ((addr >> 16) & 0xFF) as u8;
            buf[3..3 + data.len()].copy_from_slice(data);
            3 + block_size
        }
        HalfKayVersion::V3 => {
            buf[1] = (addr & 0xFF) as u8;
            buf[2] = ((addr >> 8) & 0xFF) as u8;
            buf[3] = ((addr >> 16) & 0xFF) as u8;
            buf[65..65 + data.len()].copy_from_slice(data);
            65 + block_size
        }
    };

    Packet { buf, len }
}

/// Write a packet, retrying transient I/O errors until the deadline.
///
/// The bootloader keeps working (erasing, programming) while we talk
/// to it, so writes fail sporadically; anything that is not a plain
/// I/O error aborts immediately.
fn send<I: DeviceIo, C: Clock>(
    io: &mut I,
    clock: &C,
    packet: &Packet,
    timeout_ms: u64,
) -> Result<()> {
    let start = clock.now_ms();

    loop {
        match io.hid_write(packet.as_bytes()) {
            Ok(_) => return Ok(()),
            Err(Error::Io) if clock.now_ms().wrapping_sub(start) < timeout_ms => {
                clock.sleep_ms(RETRY_DELAY_MS);
            }
            Err(err) => return Err(err),
        }
    }
}

fn check_bootloader_support(model: &Model, allow_experimental: bool) -> Result<()> {
    if model.experimental && !allow_experimental {
        log::debug!("Refusing experimental model '{}'", model.name);
        return Err(Error::Unsupported);
    }
    Ok(())
}

/// Upload progress callback: `(offset, total)` in bytes.
///
/// Invoked once with offset 0 before the first block and after every
/// block write. Returning an error aborts the upload.
pub type ProgressFn<'a> = dyn FnMut(usize, usize) -> Result<()> + 'a;

/// Stream a firmware image to a HalfKay bootloader.
///
/// The first block triggers a full chip erase, which takes a while;
/// subsequent blocks only need a short pause to avoid the bootloader
/// STALLing (EPIPE on Linux) when pushed too fast.
pub fn upload<I: DeviceIo, C: Clock>(
    io: &mut I,
    clock: &C,
    model: &Model,
    image: &[u8],
    allow_experimental: bool,
    progress: &mut ProgressFn<'_>,
) -> Result<()> {
    check_bootloader_support(model, allow_experimental)?;

    let version = model.halfkay.ok_or(Error::Unsupported)?;
    let size = image.len();

    progress(0, size)?;

    let mut addr = 0;
    while addr < size {
        let block = &image[addr..size.min(addr + model.block_size)];

        let packet = build_packet(version, model.block_size, addr, block);
        send(io, clock, &packet, UPLOAD_SEND_TIMEOUT_MS)?;

        clock.sleep_ms(if addr == 0 { ERASE_DELAY_MS } else { BLOCK_DELAY_MS });

        addr += block.len();
        progress(addr, size)?;
    }

    Ok(())
}

/// Make the bootloader jump into the uploaded application
pub fn reset<I: DeviceIo, C: Clock>(
    io: &mut I,
    clock: &C,
    model: &Model,
    allow_experimental: bool,
) -> Result<()> {
    check_bootloader_support(model, allow_experimental)?;

    let version = model.halfkay.ok_or(Error::Unsupported)?;
    let packet = build_packet(version, model.block_size, RESET_ADDRESS, &[]);
    send(io, clock, &packet, RESET_SEND_TIMEOUT_MS)
}

/// Reboot a running application into the bootloader.
///
/// CDC interfaces react to the magic baudrate; SEREMU interfaces react
/// to a feature report. The baudrate is restored right away because
/// some systems (such as Linux) keep tty settings around and the
/// device would keep rebooting on every open if 134 stays cached.
pub fn reboot<I: DeviceIo>(io: &mut I, device_type: DeviceType) -> Result<()> {
    match device_type {
        DeviceType::Serial => {
            io.serial_set_config(&SerialConfig {
                baudrate: REBOOT_BAUDRATE,
            })?;
            let _ = io.serial_set_config(&SerialConfig { baudrate: 115_200 });
            Ok(())
        }
        DeviceType::Hid => {
            io.hid_send_feature_report(&SEREMU_REBOOT_REPORT)?;
            Ok(())
        }
    }
}
