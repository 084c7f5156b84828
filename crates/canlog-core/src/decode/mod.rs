//! Frame Decoding
//!
//! Turns raw CAN payloads into physical values using message definitions
//! kept as data: identifier, minimum DLC, an optional OBD-II multiplexer and
//! a list of signals, each with a raw-field layout, a remap, scale/offset,
//! unit and provenance.
//!
//! Decoding is a passive, best-effort operation. A frame that is too short,
//! does not match a multiplexer, or has an unknown identifier is ignored
//! without reporting anything.

mod catalog;
mod store;

pub use catalog::{builtin_catalog, Catalog};
pub use store::{DecodedValue, SignalStore};

use serde::{Deserialize, Serialize};

use crate::frame::CanFrame;
use crate::signal::{self, ByteOrder, MAX_START_BIT, PAYLOAD_LEN};
use crate::unit_conversion::Unit;

/// Whether a signal's formula has been checked against a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Checked against a gauge or a published standard
    Verified,
    /// Placeholder or candidate formula
    Unverified,
}

/// Where a signal's raw bits live in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawField {
    /// Unsigned big-endian integer spanning `len` whole bytes from `start`
    Bytes { start: u8, len: u8 },
    /// Bit field walked with the signal extractor
    Bits {
        order: ByteOrder,
        start_bit: u8,
        length: u8,
    },
}

impl RawField {
    /// Width of the raw value in bits
    pub fn width(&self) -> u8 {
        match self {
            RawField::Bytes { len, .. } => len.saturating_mul(8),
            RawField::Bits { length, .. } => *length,
        }
    }

    /// Read the raw unsigned value, `None` when the layout is out of range
    pub fn read(&self, data: &[u8; PAYLOAD_LEN]) -> Option<u32> {
        match *self {
            RawField::Bytes { start, len } => {
                let end = start as usize + len as usize;
                if len == 0 || len > 4 || end > PAYLOAD_LEN {
                    return None;
                }
                Some(
                    data[start as usize..end]
                        .iter()
                        .fold(0u32, |acc, b| (acc << 8) | *b as u32),
                )
            }
            RawField::Bits {
                order,
                start_bit,
                length,
            } => {
                if length == 0 || length > 32 || start_bit >= MAX_START_BIT {
                    return None;
                }
                Some(signal::extract(data, order, start_bit, length))
            }
        }
    }
}

/// Unsigned-to-signed mapping applied before scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remap {
    /// Raw value is unsigned
    #[default]
    None,
    /// Raw value is two's complement of the field width
    TwosComplement,
    /// `raw - 2^(width-1)`, the "offset-512" style for 10-bit fields
    HalfRange,
}

impl Remap {
    /// Map a raw field of `width` bits to a signed value
    pub fn apply(&self, raw: u32, width: u8) -> i64 {
        match self {
            Remap::None => raw as i64,
            Remap::TwosComplement => signal::sign_extend(raw, width) as i64,
            Remap::HalfRange => {
                if width == 0 || width > 32 {
                    raw as i64
                } else {
                    raw as i64 - (1i64 << (width - 1))
                }
            }
        }
    }
}

/// A signal description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDef {
    /// Unique name
    pub name: String,
    /// Where the raw bits live
    pub field: RawField,
    /// How the raw bits become a signed value
    #[serde(default)]
    pub remap: Remap,
    /// Multiplier applied after remapping
    pub scale: f64,
    /// Added after scaling
    #[serde(default)]
    pub offset: f64,
    /// Physical unit of the result
    pub unit: Unit,
    /// Whether the formula was checked against reference data
    pub provenance: Provenance,
}

impl SignalDef {
    /// `physical = remap(raw) * scale + offset`
    pub fn decode(&self, data: &[u8; PAYLOAD_LEN]) -> Option<f64> {
        let raw = self.field.read(data)?;
        let signed = self.remap.apply(raw, self.field.width());
        Some(signed as f64 * self.scale + self.offset)
    }
}

/// OBD-II single-frame response selector.
///
/// Byte 0 is the payload length, byte 1 the response service and byte 2
/// the PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mux {
    /// Response service byte (request service + 0x40)
    pub service: u8,
    /// Parameter identifier
    pub pid: u8,
    /// Smallest acceptable value of the length byte
    pub min_len: u8,
}

impl Mux {
    /// Whether the frame is a response for this service and PID
    pub fn matches(&self, frame: &CanFrame) -> bool {
        frame.data_length_code >= 3
            && frame.data[1] == self.service
            && frame.data[2] == self.pid
            && frame.data[0] >= self.min_len
    }
}

/// A message on the bus and the signals it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDef {
    /// Unique name
    pub name: String,
    /// CAN identifier
    pub id: u32,
    /// Frames shorter than this are ignored
    pub min_dlc: u8,
    /// OBD-II selector for diagnostic responses
    #[serde(default)]
    pub mux: Option<Mux>,
    /// Signals carried by the frame
    pub signals: Vec<SignalDef>,
}

impl MessageDef {
    /// Whether this definition applies to the frame
    pub fn accepts(&self, frame: &CanFrame) -> bool {
        frame.identifier == self.id
            && frame.data_length_code >= self.min_dlc
            && self.mux.map_or(true, |mux| mux.matches(frame))
    }

    /// Check the layout of every signal, for definitions loaded at runtime
    pub fn check(&self) -> Result<(), String> {
        if self.min_dlc as usize > PAYLOAD_LEN {
            return Err(format!("{}: min_dlc {} exceeds 8", self.name, self.min_dlc));
        }
        for signal in &self.signals {
            if signal.field.read(&[0; PAYLOAD_LEN]).is_none() {
                return Err(format!(
                    "{}.{}: field {:?} is out of range",
                    self.name, signal.name, signal.field
                ));
            }
            if let RawField::Bytes { start, len } = signal.field {
                if start as usize + len as usize > self.min_dlc as usize {
                    return Err(format!(
                        "{}.{}: bytes {}..{} lie beyond min_dlc {}",
                        self.name,
                        signal.name,
                        start,
                        start + len,
                        self.min_dlc
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One signal value decoded from a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedSignal<'a> {
    /// Definition that produced the value
    pub def: &'a SignalDef,
    /// Physical value
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(field: RawField, remap: Remap, scale: f64, offset: f64) -> SignalDef {
        SignalDef {
            name: "test".into(),
            field,
            remap,
            scale,
            offset,
            unit: Unit::None,
            provenance: Provenance::Unverified,
        }
    }

    #[test]
    fn test_bytes_field_big_endian() {
        let data = [0x1A, 0x6F, 0, 0, 0, 0, 0, 0];
        let field = RawField::Bytes { start: 0, len: 2 };
        assert_eq!(field.read(&data), Some(0x1A6F));
        assert_eq!(RawField::Bytes { start: 7, len: 2 }.read(&data), None);
        assert_eq!(RawField::Bytes { start: 0, len: 5 }.read(&data), None);
    }

    #[test]
    fn test_half_range_remap() {
        assert_eq!(Remap::HalfRange.apply(512, 10), 0);
        assert_eq!(Remap::HalfRange.apply(0, 10), -512);
        assert_eq!(Remap::HalfRange.apply(1023, 10), 511);
        assert_eq!(Remap::TwosComplement.apply(0xFF, 8), -1);
        assert_eq!(Remap::None.apply(0xFF, 8), 255);
    }

    #[test]
    fn test_signal_formula() {
        // (raw - 40) for a single byte
        let def = signal(RawField::Bytes { start: 3, len: 1 }, Remap::None, 1.0, -40.0);
        let data = [0x03, 0x41, 0x0F, 0x50, 0, 0, 0, 0];
        assert_eq!(def.decode(&data), Some(40.0));
    }

    #[test]
    fn test_mux_requires_service_pid_and_length() {
        let mux = Mux {
            service: 0x41,
            pid: 0x0C,
            min_len: 4,
        };
        let ok = CanFrame::new(0x7E8, &[0x04, 0x41, 0x0C, 0x1A, 0xF8, 0, 0, 0]).unwrap();
        assert!(mux.matches(&ok));

        let short = CanFrame::new(0x7E8, &[0x03, 0x41, 0x0C, 0x1A, 0xF8, 0, 0, 0]).unwrap();
        assert!(!mux.matches(&short));

        let other_pid = CanFrame::new(0x7E8, &[0x04, 0x41, 0x0D, 0x1A, 0, 0, 0, 0]).unwrap();
        assert!(!mux.matches(&other_pid));

        let truncated = CanFrame::new(0x7E8, &[0x04, 0x41]).unwrap();
        assert!(!mux.matches(&truncated));
    }

    #[test]
    fn test_check_rejects_bytes_past_min_dlc() {
        let def = MessageDef {
            name: "short".into(),
            id: 0x100,
            min_dlc: 2,
            mux: None,
            signals: vec![signal(RawField::Bytes { start: 1, len: 2 }, Remap::None, 1.0, 0.0)],
        };
        assert!(def.check().is_err());
    }
}
