//! Data logging errors

use thiserror::Error;

/// Errors from [`CanLogger::init`](super::CanLogger::init)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Storage reported not ready
    #[error("Storage is not ready")]
    NotReady,

    /// Zero capacity or a configuration that fails validation
    #[error("Invalid argument: zero ring capacity or invalid configuration")]
    InvalidArg,

    /// Buffers could not be allocated
    #[error("Out of memory allocating logger buffers")]
    OutOfMemory,
}

/// Errors from [`CanLogger::start`](super::CanLogger::start)
#[derive(Error, Debug)]
pub enum StartError {
    /// `init` has not succeeded
    #[error("Logger is not initialized")]
    NotInitialized,

    /// Storage reported not ready
    #[error("Storage is not ready")]
    StorageNotReady,

    /// No log file could be named or created
    #[error("Failed to create log file: {0}")]
    FileCreateFailed(#[source] std::io::Error),

    /// The writer thread could not be started
    #[error("Failed to spawn writer thread: {0}")]
    WriterSpawnFailed(#[source] std::io::Error),
}

/// Errors from [`CanLogger::stop`](super::CanLogger::stop)
#[derive(Error, Debug)]
pub enum StopError {
    /// The writer thread panicked; its file was lost
    #[error("Writer thread panicked")]
    WriterPanicked,

    /// Closing the log file failed
    #[error("Failed to close log file: {0}")]
    CloseFailed(#[source] std::io::Error),
}

/// Errors from [`CanLogger::log_message`](super::CanLogger::log_message)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// No session is running
    #[error("Logger is not running")]
    NotRunning,

    /// Ring full or briefly locked; the frame was dropped
    #[error("Ring buffer full, frame dropped")]
    BufferFull,
}

/// Errors pushing a batch to the log file
#[derive(Error, Debug)]
pub enum WriteError {
    /// The file accepted only part of the batch
    #[error("Short write: expected {expected} bytes, wrote {written}")]
    ShortWrite {
        /// Bytes handed to the file
        expected: usize,
        /// Bytes the file accepted
        written: usize,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reading a binary log
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than a header
    #[error("File too short for a log header")]
    TooShort,

    /// Not a binary CAN log
    #[error("Bad magic: {0:02X?}")]
    BadMagic([u8; 8]),

    /// Written by a newer format version
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// Header size field disagrees with this version
    #[error("Unexpected header size {0}")]
    UnexpectedHeaderSize(u16),

    /// Record size field disagrees with this version
    #[error("Unexpected record size {0}")]
    UnexpectedRecordSize(u32),
}
