//! SEREMU framing
//!
//! SEREMU emulates a serial link over HID. Output goes in fixed
//! 32-byte reports; input arrives in 64-byte reports whose payload
//! ends at the first NUL, so binary transfers are not possible.

use crate::device::DeviceIo;
use crate::error::Result;

/// Payload bytes per output report
pub const TX_SIZE: usize = 32;

/// Payload bytes per input report
pub const RX_SIZE: usize = 64;

/// Read emulated serial data. Returns the number of text bytes copied
/// into `buf`.
pub fn read<I: DeviceIo>(io: &mut I, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
    let mut report = [0u8; RX_SIZE + 1];

    let r = io.hid_read(&mut report, timeout_ms)?;
    if r < 2 {
        return Ok(0);
    }

    let payload = &report[1..r];
    let len = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let len = len.min(buf.len());
    buf[..len].copy_from_slice(&payload[..len]);

    Ok(len)
}

/// Write emulated serial data, chunked into zero-padded reports.
/// Returns the number of payload bytes accepted by the device.
pub fn write<I: DeviceIo>(io: &mut I, buf: &[u8]) -> Result<usize> {
    let mut total = 0;

    while total < buf.len() {
        let chunk = &buf[total..buf.len().min(total + TX_SIZE)];

        let mut report = [0u8; TX_SIZE + 1];
        report[1..1 + chunk.len()].copy_from_slice(chunk);

        let r = io.hid_write(&report)?;
        if r == 0 {
            break;
        }

        total += chunk.len().min(r - 1);
    }

    Ok(total)
}
