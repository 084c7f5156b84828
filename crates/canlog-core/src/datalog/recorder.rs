//! CAN logger
//!
//! Session control and the producer side of the logging pipeline. Frames
//! are handed over through a bounded ring without ever blocking the caller;
//! a writer thread per session turns them into a log file.

use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::stats::{LoggerState, LoggerStats};
use super::writer::{Shared, WriteBuffer, Writer, WriterOutput};
use super::{EnqueueError, InitError, StartError, StopError};
use crate::config::LoggerConfig;
use crate::frame::{CanFrame, TimestampedFrame};
use crate::session::{choose_file_name, BlockStorage, SessionStart, TimeSource};

/// Bytes of ring capacity taken by one queued frame
pub const RING_SLOT_BYTES: usize = 32;

/// Number of ring slots for a capacity in bytes.
///
/// The capacity is rounded up to 4-byte alignment; at least one slot is
/// always available.
pub fn ring_slots(capacity_bytes: usize) -> usize {
    let aligned = capacity_bytes.saturating_add(3) & !3;
    (aligned / RING_SLOT_BYTES).max(1)
}

/// Fail with `OutOfMemory` where building a ring of `slots` would not fit.
///
/// The channel aborts on allocation failure, so the same allocation is
/// tried fallibly first.
fn reserve_ring(slots: usize) -> Result<(), InitError> {
    // each channel slot carries a stamp next to the frame
    let slot_size = mem::size_of::<TimestampedFrame>() + mem::size_of::<usize>();
    let bytes = slots
        .checked_mul(slot_size)
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or(InitError::OutOfMemory)?;
    let mut trial: Vec<u8> = Vec::new();
    trial
        .try_reserve_exact(bytes)
        .map_err(|_| InitError::OutOfMemory)
}

struct Ring {
    tx: Sender<TimestampedFrame>,
    rx: Receiver<TimestampedFrame>,
    slots: usize,
}

#[derive(Default)]
struct Control {
    initialized: bool,
    /// Write buffer, lent to the writer while a session runs
    write_buffer: Option<Vec<u8>>,
    writer: Option<JoinHandle<WriterOutput>>,
}

/// Logs CAN frames to block storage.
///
/// One value per bus. Share it with `Arc`: any thread may call
/// [`log_message`](Self::log_message) and [`get_stats`](Self::get_stats)
/// while another controls the session.
pub struct CanLogger {
    config: LoggerConfig,
    storage: Arc<dyn BlockStorage>,
    clock: Arc<dyn TimeSource>,
    shared: Arc<Shared>,
    /// Producers only ever `try_read` this
    ring: RwLock<Option<Ring>>,
    control: Mutex<Control>,
}

impl CanLogger {
    /// Create a logger; nothing is allocated until [`init`](Self::init)
    pub fn new(
        config: LoggerConfig,
        storage: Arc<dyn BlockStorage>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            storage,
            clock,
            shared: Arc::new(Shared::default()),
            ring: RwLock::new(None),
            control: Mutex::new(Control::default()),
        }
    }

    /// Configuration the logger was built with
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Allocate the ring and the write buffer.
    ///
    /// Calling it again while initialized does nothing.
    pub fn init(&self, capacity_bytes: usize) -> Result<(), InitError> {
        let mut control = self.control.lock();
        if control.initialized {
            return Ok(());
        }
        if !self.storage.is_ready() {
            warn!("storage not ready");
            return Err(InitError::NotReady);
        }
        if capacity_bytes == 0 {
            return Err(InitError::InvalidArg);
        }
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "rejecting logger configuration");
            return Err(InitError::InvalidArg);
        }

        let write_len = self.config.effective_write_buffer();
        let mut write_buffer = Vec::new();
        write_buffer
            .try_reserve_exact(write_len)
            .map_err(|_| InitError::OutOfMemory)?;

        let slots = ring_slots(capacity_bytes);
        reserve_ring(slots)?;
        let (tx, rx) = bounded(slots);
        *self.ring.write() = Some(Ring { tx, rx, slots });

        control.write_buffer = Some(write_buffer);
        control.initialized = true;
        self.shared.stats.lock().reset_counters();
        self.shared.state.store(LoggerState::Stopped);

        info!(capacity_bytes, slots, write_buffer = write_len, "logger initialized");
        Ok(())
    }

    /// Stop if running and release the buffers
    pub fn deinit(&self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "stop during deinit failed");
        }
        let mut control = self.control.lock();
        if !control.initialized {
            return;
        }
        *self.ring.write() = None;
        control.write_buffer = None;
        control.initialized = false;
        info!("logger deinitialized");
    }

    /// Whether [`init`](Self::init) has succeeded and not been undone
    pub fn is_initialized(&self) -> bool {
        self.control.lock().initialized
    }

    /// Number of frames the ring holds, 0 before init
    pub fn ring_capacity(&self) -> usize {
        self.ring.read().as_ref().map_or(0, |ring| ring.slots)
    }

    /// Open a new log file and start the writer.
    ///
    /// Does nothing when already running. Counters are reset for the new
    /// session.
    pub fn start(&self) -> Result<(), StartError> {
        let mut control = self.control.lock();
        if !control.initialized {
            return Err(StartError::NotInitialized);
        }
        if self.shared.state.load() == LoggerState::Running {
            debug!("already running");
            return Ok(());
        }
        // A writer that died on its own still holds its buffer.
        if let Err(e) = self.reap_writer(&mut control) {
            warn!(error = %e, "previous session did not end cleanly");
        }

        if !self.storage.is_ready() {
            return Err(StartError::StorageNotReady);
        }

        let format = self.config.format;
        let file_name = choose_file_name(
            self.storage.as_ref(),
            self.clock.as_ref(),
            &self.config.file_prefix,
            format.extension(),
        )
        .and_then(|name| self.storage.create(&name).map(|file| (name, file)));
        let (name, file) = match file_name {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, "failed to create log file");
                self.shared.state.store(LoggerState::Error);
                return Err(StartError::FileCreateFailed(e));
            }
        };

        let ring_guard = self.ring.read();
        let Some(ring) = ring_guard.as_ref() else {
            return Err(StartError::NotInitialized);
        };
        // Leftovers from a session that ended in error belong to no file.
        while ring.rx.try_recv().is_ok() {}

        {
            let mut stats = self.shared.stats.lock();
            stats.reset_counters();
            stats.current_file = Some(name.clone());
        }

        let limit = self.config.effective_write_buffer();
        let buffer = control.write_buffer.take().unwrap_or_default();
        let writer = Writer {
            rx: ring.rx.clone(),
            file,
            buffer: WriteBuffer::new(buffer, limit),
            format,
            session: SessionStart::capture(self.clock.as_ref()),
            flush_interval: Duration::from_millis(self.config.flush_interval_ms),
            idle_wait: Duration::from_millis(self.config.idle_wait_ms),
            drain_limit: ring.slots,
            shared: Arc::clone(&self.shared),
        };
        drop(ring_guard);

        self.shared.state.store(LoggerState::Running);
        let handle = thread::Builder::new()
            .name("can-log-writer".into())
            .spawn(move || writer.run());
        match handle {
            Ok(handle) => {
                control.writer = Some(handle);
                info!(file = %name, "logging started");
                Ok(())
            }
            Err(e) => {
                // The writer and its buffer went down with the closure.
                self.shared.state.store(LoggerState::Error);
                control.write_buffer = Some(Vec::with_capacity(limit));
                Err(StartError::WriterSpawnFailed(e))
            }
        }
    }

    /// Drain, flush and close the current file.
    ///
    /// Does nothing when no session is active. Also collects a writer that
    /// stopped on its own after an I/O failure.
    pub fn stop(&self) -> Result<(), StopError> {
        let mut control = self.control.lock();
        if self.shared.state.load() == LoggerState::Running {
            // No producer is mid-enqueue while the write lock is held.
            let _ring = self.ring.write();
            self.shared.state.store(LoggerState::Stopped);
        }
        let had_writer = control.writer.is_some();
        self.reap_writer(&mut control)?;

        if had_writer {
            let stats = self.shared.stats.lock();
            info!(
                messages = stats.messages_logged,
                bytes = stats.bytes_written,
                dropped = stats.messages_dropped,
                "logging stopped"
            );
        }
        Ok(())
    }

    /// Stop the current session and start a new file
    pub fn restart(&self) -> Result<(), StartError> {
        if let Err(e) = self.stop() {
            warn!(error = %e, "stop before restart failed");
        }
        self.start()
    }

    fn reap_writer(&self, control: &mut Control) -> Result<(), StopError> {
        let Some(handle) = control.writer.take() else {
            return Ok(());
        };
        let output = match handle.join() {
            Ok(output) => output,
            Err(_) => {
                self.shared.state.store(LoggerState::Error);
                control.write_buffer = Some(Vec::with_capacity(self.config.effective_write_buffer()));
                return Err(StopError::WriterPanicked);
            }
        };
        control.write_buffer = Some(output.buffer);
        match output.file {
            Some(file) => file.close().map_err(StopError::CloseFailed),
            None => Ok(()),
        }
    }

    /// Queue a frame without blocking.
    ///
    /// A full ring, or one momentarily locked by a session change, counts
    /// the frame as dropped.
    pub fn log_message(&self, timestamp_us: i64, frame: &CanFrame) -> Result<(), EnqueueError> {
        if self.shared.state.load() != LoggerState::Running {
            return Err(EnqueueError::NotRunning);
        }
        let Some(ring) = self.ring.try_read() else {
            self.count_drop();
            return Err(EnqueueError::BufferFull);
        };
        let Some(ring) = ring.as_ref() else {
            return Err(EnqueueError::NotRunning);
        };
        if self.shared.state.load() != LoggerState::Running {
            return Err(EnqueueError::NotRunning);
        }

        match ring.tx.try_send(TimestampedFrame::new(timestamp_us, *frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.count_drop();
                Err(EnqueueError::BufferFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(EnqueueError::NotRunning),
        }
    }

    /// Queue a frame stamped with the logger's monotonic clock
    pub fn log_frame(&self, frame: &CanFrame) -> Result<(), EnqueueError> {
        self.log_message(self.clock.now_monotonic_us(), frame)
    }

    fn count_drop(&self) {
        let mut stats = self.shared.stats.lock();
        stats.messages_dropped += 1;
        stats.buffer_overruns += 1;
    }

    /// Snapshot of the counters and state
    pub fn get_stats(&self) -> LoggerStats {
        let mut stats = self.shared.stats.lock().clone();
        stats.state = self.shared.state.load();
        stats
    }

    /// Zero the counters; state and current file are kept
    pub fn reset_stats(&self) {
        self.shared.stats.lock().reset_counters();
    }

    /// Current session state
    pub fn state(&self) -> LoggerState {
        self.shared.state.load()
    }

    /// Whether frames are being accepted
    pub fn is_running(&self) -> bool {
        self.state() == LoggerState::Running
    }
}

impl Drop for CanLogger {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "failed to stop logger on drop");
        }
    }
}
