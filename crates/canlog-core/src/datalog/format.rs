//! Log file formats
//!
//! Binary logs are a 64-byte header followed by 24-byte records, all
//! little-endian and written field by field. CSV logs are one line per frame
//! under a fixed column header.

use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::PlaybackError;
use crate::frame::{CanFrame, TimestampedFrame};
use crate::session::SessionStart;
use crate::signal::PAYLOAD_LEN;

/// File magic of binary logs
pub const BINARY_MAGIC: [u8; 8] = *b"CANBIN\0\0";
/// Current binary format version
pub const BINARY_VERSION: u16 = 1;
/// Size of the binary header
pub const HEADER_LEN: usize = 64;
/// Size of one binary record
pub const RECORD_LEN: usize = 24;

const HEADER_RESERVED: usize = 28;

// magic, version, header_size, unix, monotonic, record_size, flags, reserved
const _: () = assert!(8 + 2 + 2 + 8 + 8 + 4 + 4 + HEADER_RESERVED == HEADER_LEN);
// timestamp, can_id, dlc, flags, data, reserved
const _: () = assert!(8 + 4 + 1 + 1 + PAYLOAD_LEN + 2 == RECORD_LEN);

/// CSV column header
pub const CSV_HEADER: &str = "datetime,timestamp_us,can_id,dlc,b0,b1,b2,b3,b4,b5,b6,b7\n";

/// Longest CSV line: datetime, 20-digit timestamp, 8-digit id, dlc, 8 bytes
const CSV_MAX_LINE: usize = 19 + 1 + 20 + 1 + 8 + 1 + 1 + 8 * 3 + 1;

/// Supported log file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Fixed-size binary records
    #[default]
    Binary,
    /// Comma-separated values
    Csv,
}

impl LogFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "bin" => Some(LogFormat::Binary),
            "csv" => Some(LogFormat::Csv),
            _ => None,
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Binary => "bin",
            LogFormat::Csv => "csv",
        }
    }

    /// Upper bound on the encoded size of one record
    pub fn max_record_len(&self) -> usize {
        match self {
            LogFormat::Binary => RECORD_LEN,
            LogFormat::Csv => CSV_MAX_LINE,
        }
    }
}

/// Binary log header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    /// Always `BINARY_MAGIC`
    pub magic: [u8; 8],
    /// Format version
    pub version: u16,
    /// Bytes before the first record
    pub header_size: u16,
    /// Wall clock at session start, 0 without a valid clock
    pub log_start_unix_us: u64,
    /// Monotonic clock at session start
    pub log_start_monotonic_us: u64,
    /// Bytes per record
    pub record_size: u32,
    /// Reserved, 0
    pub flags: u32,
}

impl BinaryHeader {
    /// Header for a session starting at `start`
    pub fn new(start: &SessionStart) -> Self {
        Self {
            magic: BINARY_MAGIC,
            version: BINARY_VERSION,
            header_size: HEADER_LEN as u16,
            log_start_unix_us: u64::try_from(start.unix_us).unwrap_or(0),
            log_start_monotonic_us: u64::try_from(start.monotonic_us).unwrap_or(0),
            record_size: RECORD_LEN as u32,
            flags: 0,
        }
    }

    /// The clock pair stored in the header
    pub fn session_start(&self) -> SessionStart {
        SessionStart {
            unix_us: i64::try_from(self.log_start_unix_us).unwrap_or(0),
            monotonic_us: i64::try_from(self.log_start_monotonic_us).unwrap_or(0),
        }
    }

    /// Serialize in little-endian order
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.magic)?;
        w.write_u16::<LittleEndian>(self.version)?;
        w.write_u16::<LittleEndian>(self.header_size)?;
        w.write_u64::<LittleEndian>(self.log_start_unix_us)?;
        w.write_u64::<LittleEndian>(self.log_start_monotonic_us)?;
        w.write_u32::<LittleEndian>(self.record_size)?;
        w.write_u32::<LittleEndian>(self.flags)?;
        w.write_all(&[0u8; HEADER_RESERVED])
    }

    /// Read and validate a header
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, PlaybackError> {
        let mut raw = [0u8; HEADER_LEN];
        r.read_exact(&mut raw).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => PlaybackError::TooShort,
            _ => PlaybackError::Io(e),
        })?;

        let mut cursor = &raw[..];
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if magic != BINARY_MAGIC {
            return Err(PlaybackError::BadMagic(magic));
        }
        let version = cursor.read_u16::<LittleEndian>()?;
        if version != BINARY_VERSION {
            return Err(PlaybackError::UnsupportedVersion(version));
        }
        let header_size = cursor.read_u16::<LittleEndian>()?;
        if header_size as usize != HEADER_LEN {
            return Err(PlaybackError::UnexpectedHeaderSize(header_size));
        }
        let log_start_unix_us = cursor.read_u64::<LittleEndian>()?;
        let log_start_monotonic_us = cursor.read_u64::<LittleEndian>()?;
        let record_size = cursor.read_u32::<LittleEndian>()?;
        if record_size as usize != RECORD_LEN {
            return Err(PlaybackError::UnexpectedRecordSize(record_size));
        }
        let flags = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            version,
            header_size,
            log_start_unix_us,
            log_start_monotonic_us,
            record_size,
            flags,
        })
    }
}

/// One binary record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    /// Monotonic receive time
    pub timestamp_us: u64,
    /// CAN identifier
    pub can_id: u32,
    /// Data length code
    pub dlc: u8,
    /// Reserved, 0
    pub flags: u8,
    /// Payload, zero padded
    pub data: [u8; PAYLOAD_LEN],
}

impl LogRecord {
    /// Negative timestamps are stored as 0
    pub fn from_frame(entry: &TimestampedFrame) -> Self {
        Self {
            timestamp_us: u64::try_from(entry.timestamp_us).unwrap_or(0),
            can_id: entry.frame.identifier,
            dlc: entry.frame.data_length_code,
            flags: 0,
            data: entry.frame.data,
        }
    }

    /// The logged frame
    pub fn frame(&self) -> CanFrame {
        CanFrame::from_parts(self.can_id, self.dlc, self.data)
    }

    /// Serialize in little-endian order
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.timestamp_us)?;
        w.write_u32::<LittleEndian>(self.can_id)?;
        w.write_u8(self.dlc)?;
        w.write_u8(self.flags)?;
        w.write_all(&self.data)?;
        w.write_u16::<LittleEndian>(0)
    }

    /// Decode one record from exactly [`RECORD_LEN`] bytes
    pub fn decode(raw: &[u8; RECORD_LEN]) -> Self {
        let mut cursor = &raw[..];
        // Reads from a slice of the right length cannot fail.
        let timestamp_us = cursor.read_u64::<LittleEndian>().unwrap_or(0);
        let can_id = cursor.read_u32::<LittleEndian>().unwrap_or(0);
        let dlc = cursor.read_u8().unwrap_or(0);
        let flags = cursor.read_u8().unwrap_or(0);
        let mut data = [0u8; PAYLOAD_LEN];
        data.copy_from_slice(&cursor[..PAYLOAD_LEN]);
        Self {
            timestamp_us,
            can_id,
            dlc,
            flags,
            data,
        }
    }
}

/// Append one CSV line for `record`.
///
/// `datetime` is left empty when the session has no valid wall clock.
pub fn write_csv_line<W: Write>(
    w: &mut W,
    datetime: Option<NaiveDateTime>,
    record: &LogRecord,
) -> io::Result<()> {
    if let Some(dt) = datetime {
        write!(w, "{}", dt.format("%Y-%m-%d %H:%M:%S"))?;
    }
    write!(w, ",{},{:03X},{}", record.timestamp_us, record.can_id, record.dlc)?;
    for byte in &record.data {
        write!(w, ",{:02X}", byte)?;
    }
    writeln!(w)
}
