//! Logger state and statistics

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Logger lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerState {
    /// No session; frames are rejected
    #[default]
    Stopped,
    /// A writer is consuming frames
    Running,
    /// An unrecoverable I/O failure ended the session; only `start` leaves it
    Error,
}

impl LoggerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoggerState::Running,
            2 => LoggerState::Error,
            _ => LoggerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoggerState::Stopped => 0,
            LoggerState::Running => 1,
            LoggerState::Error => 2,
        }
    }
}

/// State shared between the controller, the producer and the writer
#[derive(Debug, Default)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn load(&self) -> LoggerState {
        LoggerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: LoggerState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move `Running -> Error`, leaving any other state alone
    pub(crate) fn fail_if_running(&self) {
        let _ = self.0.compare_exchange(
            LoggerState::Running.as_u8(),
            LoggerState::Error.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Snapshot of the logger counters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoggerStats {
    /// Records persisted by a successful flush
    pub messages_logged: u64,
    /// Frames rejected by a full or contended ring
    pub messages_dropped: u64,
    /// Times the producer found the ring full
    pub buffer_overruns: u64,
    /// Failed batch writes
    pub write_errors: u64,
    /// Bytes accepted by the log file, header included
    pub bytes_written: u64,
    /// State when the snapshot was taken
    pub state: LoggerState,
    /// Name of the file of the current or last session
    pub current_file: Option<String>,
}

impl LoggerStats {
    /// Zero the counters, keeping state and file name
    pub fn reset_counters(&mut self) {
        self.messages_logged = 0;
        self.messages_dropped = 0;
        self.buffer_overruns = 0;
        self.write_errors = 0;
        self.bytes_written = 0;
    }
}
