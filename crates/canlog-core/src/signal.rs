//! Signal Extraction
//!
//! Bit-field extraction over an 8-byte CAN payload.
//!
//! Big-endian signals use the DBC "Motorola, LSB-start" numbering: bits are
//! numbered 7..0 inside each byte, most significant byte first, and the start
//! bit names the bit that becomes the LSB of the extracted value. Every
//! function here is total: invalid arguments yield 0 instead of an error,
//! since extraction runs on the receive path.

use serde::{Deserialize, Serialize};

/// Number of payload bytes in a classic CAN frame
pub const PAYLOAD_LEN: usize = 8;

/// Highest valid start bit (exclusive)
pub const MAX_START_BIT: u8 = 64;

/// Widest signal that fits the 32-bit accumulator
pub const MAX_SIGNAL_LEN: u8 = 32;

/// Byte order of a bit-field signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Motorola order, start bit is the LSB
    BigEndian,
    /// Intel order, start bit is the LSB
    LittleEndian,
}

#[inline]
fn args_valid(start_bit: u8, length: u8) -> bool {
    length != 0 && length <= MAX_SIGNAL_LEN && start_bit < MAX_START_BIT
}

/// Extract an unsigned big-endian (Motorola, LSB-start) signal.
///
/// The walk starts at `start_bit` and every visited bit becomes the next
/// higher-order bit of the result. After each bit the in-byte index moves
/// down; below bit 0 the walk continues at bit 7 of the next byte. A walk
/// that runs off the end of the payload stops, leaving the remaining high
/// bits clear.
///
/// Returns 0 when `length` is 0 or above 32, or `start_bit >= 64`.
pub fn extract_be_lsb(data: &[u8; PAYLOAD_LEN], start_bit: u8, length: u8) -> u32 {
    if !args_valid(start_bit, length) {
        return 0;
    }

    let mut value = 0u32;
    let mut byte_index = (start_bit / 8) as usize;
    let mut bit_index = start_bit % 8;

    for i in 0..length {
        if byte_index >= PAYLOAD_LEN {
            break;
        }

        let bit = (data[byte_index] >> bit_index) & 0x01;
        // First visited bit is output bit 0. Shifting the accumulator left
        // instead would transpose the value.
        value |= (bit as u32) << i;

        if bit_index == 0 {
            byte_index += 1;
            bit_index = 7;
        } else {
            bit_index -= 1;
        }
    }

    value
}

/// Extract an unsigned little-endian (Intel) signal.
///
/// Output bit `i` comes from absolute bit `start_bit + i`, counted from
/// bit 0 of byte 0 upwards. Same argument policy as [`extract_be_lsb`].
pub fn extract_le(data: &[u8; PAYLOAD_LEN], start_bit: u8, length: u8) -> u32 {
    if !args_valid(start_bit, length) {
        return 0;
    }

    let mut value = 0u32;
    for i in 0..length as usize {
        let pos = start_bit as usize + i;
        let byte_index = pos / 8;
        if byte_index >= PAYLOAD_LEN {
            break;
        }
        let bit = (data[byte_index] >> (pos % 8)) & 0x01;
        value |= (bit as u32) << i;
    }

    value
}

/// Two's complement sign extension of a `bit_length`-bit value.
///
/// Lengths of 0 and 32 or more return `value` reinterpreted unchanged.
pub fn sign_extend(value: u32, bit_length: u8) -> i32 {
    if bit_length == 0 || bit_length >= 32 {
        return value as i32;
    }

    let sign_bit = 1u32 << (bit_length - 1);
    if value & sign_bit != 0 {
        let mask = (1u32 << bit_length) - 1;
        (value | !mask) as i32
    } else {
        value as i32
    }
}

/// Extract a signed big-endian signal
pub fn extract_be_lsb_signed(data: &[u8; PAYLOAD_LEN], start_bit: u8, length: u8) -> i32 {
    sign_extend(extract_be_lsb(data, start_bit, length), length)
}

/// Extract a signed little-endian signal
pub fn extract_le_signed(data: &[u8; PAYLOAD_LEN], start_bit: u8, length: u8) -> i32 {
    sign_extend(extract_le(data, start_bit, length), length)
}

/// Extract with the given byte order
pub fn extract(data: &[u8; PAYLOAD_LEN], order: ByteOrder, start_bit: u8, length: u8) -> u32 {
    match order {
        ByteOrder::BigEndian => extract_be_lsb(data, start_bit, length),
        ByteOrder::LittleEndian => extract_le(data, start_bit, length),
    }
}
