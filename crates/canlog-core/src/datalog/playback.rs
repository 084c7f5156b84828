//! Log playback
//!
//! Reads binary logs back for analysis and conversion.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use super::format::{write_csv_line, BinaryHeader, LogRecord, CSV_HEADER, RECORD_LEN};
use super::PlaybackError;
use crate::session::SessionStart;

/// Streaming reader over a binary log
pub struct BinaryLogReader<R: Read> {
    header: BinaryHeader,
    reader: R,
    /// Bytes of an incomplete trailing record, if one was hit
    trailing: usize,
}

impl BinaryLogReader<BufReader<File>> {
    /// Open a binary log file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PlaybackError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> BinaryLogReader<R> {
    /// Read and validate the header
    pub fn new(mut reader: R) -> Result<Self, PlaybackError> {
        let header = BinaryHeader::read_from(&mut reader)?;
        Ok(Self {
            header,
            reader,
            trailing: 0,
        })
    }

    /// Validated header
    pub fn header(&self) -> &BinaryHeader {
        &self.header
    }

    /// Clock pair recorded in the header
    pub fn session_start(&self) -> SessionStart {
        self.header.session_start()
    }

    /// Size of a truncated final record, 0 if the log ended cleanly
    pub fn trailing_bytes(&self) -> usize {
        self.trailing
    }

    /// Next record, `None` at the end of the log.
    ///
    /// A partial record at the end (power lost mid-write) ends the log.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>, PlaybackError> {
        let mut raw = [0u8; RECORD_LEN];
        let mut filled = 0;
        while filled < RECORD_LEN {
            match self.reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            RECORD_LEN => Ok(Some(LogRecord::decode(&raw))),
            partial => {
                debug!(bytes = partial, "ignoring truncated record");
                self.trailing = partial;
                Ok(None)
            }
        }
    }
}

impl<R: Read> Iterator for BinaryLogReader<R> {
    type Item = Result<LogRecord, PlaybackError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Overview of a binary log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSummary {
    /// Clock pair from the header
    pub session: SessionStart,
    /// Complete records
    pub record_count: u64,
    /// Timestamp of the first record
    pub first_timestamp_us: Option<u64>,
    /// Timestamp of the last record
    pub last_timestamp_us: Option<u64>,
    /// Records per CAN identifier
    pub per_id: BTreeMap<u32, u64>,
    /// Bytes of a truncated final record
    pub trailing_bytes: usize,
}

impl LogSummary {
    /// Time between the first and last record
    pub fn duration_us(&self) -> u64 {
        match (self.first_timestamp_us, self.last_timestamp_us) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        }
    }
}

/// Summarize a binary log
pub fn summarize<R: Read>(mut reader: BinaryLogReader<R>) -> Result<LogSummary, PlaybackError> {
    let mut summary = LogSummary {
        session: reader.session_start(),
        record_count: 0,
        first_timestamp_us: None,
        last_timestamp_us: None,
        per_id: BTreeMap::new(),
        trailing_bytes: 0,
    };
    while let Some(record) = reader.next_record()? {
        summary.record_count += 1;
        summary.first_timestamp_us.get_or_insert(record.timestamp_us);
        summary.last_timestamp_us = Some(record.timestamp_us);
        *summary.per_id.entry(record.can_id).or_default() += 1;
    }
    summary.trailing_bytes = reader.trailing_bytes();
    Ok(summary)
}

/// Rewrite a binary log as CSV, returning the number of records converted.
///
/// Datetimes are rebuilt from the header clock pair and left empty when the
/// session had no valid wall clock.
pub fn convert_to_csv<R: Read, W: Write>(
    mut reader: BinaryLogReader<R>,
    out: W,
) -> Result<u64, PlaybackError> {
    let session = reader.session_start();
    let mut out = BufWriter::new(out);
    out.write_all(CSV_HEADER.as_bytes())?;

    let mut count = 0;
    while let Some(record) = reader.next_record()? {
        let ts = i64::try_from(record.timestamp_us).unwrap_or(i64::MAX);
        write_csv_line(&mut out, session.local_datetime(ts), &record)?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

/// Convert `input` to CSV at `output`
pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<u64, PlaybackError> {
    let reader = BinaryLogReader::open(input)?;
    let file = File::create(output)?;
    convert_to_csv(reader, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CanFrame, TimestampedFrame};

    fn log_bytes(start: SessionStart, frames: &[(i64, u32, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        BinaryHeader::new(&start).write_to(&mut buf).unwrap();
        for (ts, id, payload) in frames {
            let frame = CanFrame::new(*id, payload).unwrap();
            LogRecord::from_frame(&TimestampedFrame::new(*ts, frame))
                .write_to(&mut buf)
                .unwrap();
        }
        buf
    }

    #[test]
    fn test_reader_iterates_records() {
        let bytes = log_bytes(
            SessionStart::default(),
            &[(10, 0x0AA, &[1, 2]), (20, 0x025, &[3, 0]), (30, 0x0AA, &[4, 0])],
        );
        let reader = BinaryLogReader::new(bytes.as_slice()).unwrap();
        let ids: Vec<u32> = reader.map(|r| r.unwrap().can_id).collect();
        assert_eq!(ids, vec![0x0AA, 0x025, 0x0AA]);
    }

    #[test]
    fn test_summary_ignores_truncated_tail() {
        let mut bytes = log_bytes(
            SessionStart::default(),
            &[(1_000, 0x0AA, &[0; 8]), (5_000, 0x0AA, &[0; 8]), (9_000, 0x7E8, &[0; 8])],
        );
        bytes.extend_from_slice(&[0xEE; 7]);
        let summary = summarize(BinaryLogReader::new(bytes.as_slice()).unwrap()).unwrap();
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.duration_us(), 8_000);
        assert_eq!(summary.per_id.get(&0x0AA), Some(&2));
        assert_eq!(summary.per_id.get(&0x7E8), Some(&1));
        assert_eq!(summary.trailing_bytes, 7);
    }

    #[test]
    fn test_convert_without_wall_clock() {
        let bytes = log_bytes(SessionStart::default(), &[(42, 0x4A7, &[0x41, 0x42])]);
        let mut out = Vec::new();
        let count = convert_to_csv(BinaryLogReader::new(bytes.as_slice()).unwrap(), &mut out).unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{CSV_HEADER},42,4A7,2,41,42,00,00,00,00,00,00\n")
        );
    }
}
