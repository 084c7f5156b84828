//! CAN frames
//!
//! Value types handed from the receive path to the decoders and the logger.

use embedded_can::{ExtendedId, Id, StandardId};
use serde::{Deserialize, Serialize};

use crate::signal::PAYLOAD_LEN;

/// Largest 11-bit identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest 29-bit identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// A classic CAN data frame
///
/// Bytes beyond `data_length_code` are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CanFrame {
    /// 11 or 29-bit identifier
    pub identifier: u32,
    /// Whether the identifier uses the 29-bit format
    pub extended: bool,
    /// Number of valid payload bytes (0-8)
    pub data_length_code: u8,
    /// Payload, zero-padded to 8 bytes
    pub data: [u8; PAYLOAD_LEN],
}

impl CanFrame {
    /// Create a frame from a payload slice.
    ///
    /// Returns `None` when the payload is longer than 8 bytes or the identifier
    /// does not fit in 29 bits. Identifiers above 0x7FF are marked extended.
    pub fn new(identifier: u32, payload: &[u8]) -> Option<Self> {
        if payload.len() > PAYLOAD_LEN || identifier > MAX_EXTENDED_ID {
            return None;
        }
        let mut data = [0u8; PAYLOAD_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            identifier,
            extended: identifier > MAX_STANDARD_ID,
            data_length_code: payload.len() as u8,
            data,
        })
    }

    /// Build a frame from raw driver fields.
    ///
    /// The DLC is clamped to 8 and bytes past it are cleared.
    pub fn from_parts(identifier: u32, data_length_code: u8, data: [u8; PAYLOAD_LEN]) -> Self {
        let dlc = data_length_code.min(PAYLOAD_LEN as u8);
        let mut data = data;
        data[dlc as usize..].fill(0);
        Self {
            identifier: identifier & MAX_EXTENDED_ID,
            extended: identifier > MAX_STANDARD_ID,
            data_length_code: dlc,
            data,
        }
    }

    /// The valid part of the payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data_length_code as usize]
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let (identifier, extended) = match id.into() {
            Id::Standard(id) => (id.as_raw() as u32, false),
            Id::Extended(id) => (id.as_raw(), true),
        };
        let mut frame = CanFrame::new(identifier, data)?;
        frame.extended = extended;
        Some(frame)
    }

    /// Remote frames carry no payload to log or decode
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        self.extended
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        if self.extended {
            ExtendedId::new(self.identifier)
                .map(Id::Extended)
                .unwrap_or(Id::Extended(ExtendedId::MAX))
        } else {
            StandardId::new(self.identifier as u16)
                .map(Id::Standard)
                .unwrap_or(Id::Standard(StandardId::MAX))
        }
    }

    fn dlc(&self) -> usize {
        self.data_length_code as usize
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

/// A frame stamped at the moment the producer accepted it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedFrame {
    /// Monotonic microseconds since boot
    pub timestamp_us: i64,
    /// The received frame
    pub frame: CanFrame,
}

impl TimestampedFrame {
    /// Pair a frame with its receive time
    pub fn new(timestamp_us: i64, frame: CanFrame) -> Self {
        Self {
            timestamp_us,
            frame,
        }
    }
}
