//! Writer thread
//!
//! Drains the ring into a fixed-size write buffer and pushes whole batches
//! to the log file. The thread owns the file for the length of a session
//! and hands it (and the buffer) back through its join handle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use super::format::{write_csv_line, BinaryHeader, LogFormat, LogRecord, CSV_HEADER};
use super::stats::{AtomicState, LoggerState, LoggerStats};
use super::WriteError;
use crate::frame::TimestampedFrame;
use crate::session::{LogFile, SessionStart};

/// State shared by the controller, producers and the writer
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) state: AtomicState,
    pub(crate) stats: Mutex<LoggerStats>,
}

/// Bytes waiting to be written and the number of records among them
pub(crate) struct WriteBuffer {
    bytes: Vec<u8>,
    limit: usize,
    pending: u64,
}

impl WriteBuffer {
    /// Wrap a pre-allocated vector; at most `limit` bytes are batched
    pub(crate) fn new(mut bytes: Vec<u8>, limit: usize) -> Self {
        bytes.clear();
        Self {
            bytes,
            limit,
            pending: 0,
        }
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn has_room(&self, len: usize) -> bool {
        self.bytes.len() + len <= self.limit
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.pending = 0;
    }
}

/// What the writer thread returns to whoever joins it
pub(crate) struct WriterOutput {
    /// `None` when the writer already closed the file after a fatal error
    pub(crate) file: Option<Box<dyn LogFile>>,
    pub(crate) buffer: Vec<u8>,
}

pub(crate) struct Writer {
    pub(crate) rx: Receiver<TimestampedFrame>,
    pub(crate) file: Box<dyn LogFile>,
    pub(crate) buffer: WriteBuffer,
    pub(crate) format: LogFormat,
    pub(crate) session: SessionStart,
    pub(crate) flush_interval: Duration,
    pub(crate) idle_wait: Duration,
    /// Upper bound on frames taken per drain pass
    pub(crate) drain_limit: usize,
    pub(crate) shared: Arc<Shared>,
}

impl Writer {
    pub(crate) fn run(mut self) -> WriterOutput {
        if let Err(e) = self.write_header() {
            error!(error = %e, "failed to write log header");
            self.shared.stats.lock().write_errors += 1;
            self.shared.state.fail_if_running();
            if let Err(e) = self.file.close() {
                warn!(error = %e, "failed to close log file");
            }
            return WriterOutput {
                file: None,
                buffer: self.buffer.into_inner(),
            };
        }

        let mut last_flush = Instant::now();
        while self.shared.state.load() == LoggerState::Running {
            let mut drained = 0;
            while drained < self.drain_limit {
                match self.rx.try_recv() {
                    Ok(entry) => {
                        self.push(&entry);
                        drained += 1;
                    }
                    Err(_) => break,
                }
            }

            if drained == 0 {
                match self.rx.recv_timeout(self.idle_wait) {
                    Ok(entry) => self.push(&entry),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            if last_flush.elapsed() >= self.flush_interval {
                self.flush_batch();
                last_flush = Instant::now();
            }
        }

        // Everything enqueued before the state left Running is still in the ring.
        while let Ok(entry) = self.rx.try_recv() {
            self.push(&entry);
        }
        self.flush_batch();
        debug!("writer finished");

        WriterOutput {
            file: Some(self.file),
            buffer: self.buffer.into_inner(),
        }
    }

    fn write_header(&mut self) -> Result<(), WriteError> {
        match self.format {
            LogFormat::Binary => BinaryHeader::new(&self.session).write_to(&mut self.buffer.bytes)?,
            LogFormat::Csv => self.buffer.bytes.extend_from_slice(CSV_HEADER.as_bytes()),
        }
        let len = self.buffer.bytes.len();
        let result = self.write_out();
        self.buffer.clear();
        result?;
        self.shared.stats.lock().bytes_written += len as u64;
        Ok(())
    }

    fn push(&mut self, entry: &TimestampedFrame) {
        if !self.buffer.has_room(self.format.max_record_len()) {
            self.flush_batch();
        }

        let record = LogRecord::from_frame(entry);
        let result = match self.format {
            LogFormat::Binary => record.write_to(&mut self.buffer.bytes),
            LogFormat::Csv => {
                let datetime = self.session.local_datetime(entry.timestamp_us);
                write_csv_line(&mut self.buffer.bytes, datetime, &record)
            }
        };
        // Writing into a Vec only fails on allocation, which aborts instead.
        if result.is_ok() {
            self.buffer.pending += 1;
        }
    }

    /// Write the batch out and sync. A failed batch is counted and discarded.
    fn flush_batch(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let len = self.buffer.bytes.len() as u64;
        let records = self.buffer.pending;
        let result = self.write_out();
        self.buffer.clear();

        let mut stats = self.shared.stats.lock();
        match result {
            Ok(()) => {
                stats.messages_logged += records;
                stats.bytes_written += len;
            }
            Err(e) => {
                stats.write_errors += 1;
                drop(stats);
                warn!(error = %e, records, "log write failed, batch discarded");
            }
        }
    }

    fn write_out(&mut self) -> Result<(), WriteError> {
        let expected = self.buffer.bytes.len();
        let written = self.file.write(&self.buffer.bytes)?;
        if written != expected {
            return Err(WriteError::ShortWrite { expected, written });
        }
        self.file.flush()?;
        Ok(())
    }
}
