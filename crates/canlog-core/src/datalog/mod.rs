//! Data Logging
//!
//! Records CAN traffic to block storage and plays it back.
//!
//! A producer calls [`CanLogger::log_message`] from the receive path; the
//! frame goes into a bounded ring and a writer thread batches it into the
//! session's log file, binary or CSV.

mod error;
mod format;
mod playback;
mod recorder;
mod stats;
mod writer;

pub use error::{EnqueueError, InitError, PlaybackError, StartError, StopError, WriteError};
pub use format::{
    write_csv_line, BinaryHeader, LogFormat, LogRecord, BINARY_MAGIC, BINARY_VERSION, CSV_HEADER,
    HEADER_LEN, RECORD_LEN,
};
pub use playback::{convert_file, convert_to_csv, summarize, BinaryLogReader, LogSummary};
pub use recorder::{ring_slots, CanLogger, RING_SLOT_BYTES};
pub use stats::{LoggerState, LoggerStats};
