//! # canlog Core Library
//!
//! Core functionality for decoding and logging automotive CAN traffic.

//!
//! This library provides:
//! - Bit-exact signal extraction (Motorola LSB-start and Intel order)
//! - A data-driven catalog of frame decoders with provenance flags
//! - A non-blocking logging pipeline writing binary or CSV logs
//! - Session naming, clocks and storage abstractions
//! - Playback and conversion of binary logs
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use canlog_core::prelude::*;
//!
//! let storage = Arc::new(DirectoryStorage::new("/sdcard"));
//! let logger = CanLogger::new(LoggerConfig::default(), storage, Arc::new(SystemClock::new()));
//! logger.init(32 * 1024)?;
//! logger.start()?;
//!
//! // From the receive path
//! logger.log_frame(&frame)?;
//!
//! logger.stop()?;
//! println!("{:?}", logger.get_stats());
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod datalog;
pub mod decode;
pub mod demo;
pub mod frame;
pub mod session;
pub mod signal;
pub mod unit_conversion;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, LoggerConfig};
    pub use crate::datalog::{
        BinaryLogReader, CanLogger, EnqueueError, InitError, LogFormat, LoggerState, LoggerStats,
        StartError, StopError,
    };
    pub use crate::decode::{builtin_catalog, Catalog, Provenance, SignalStore};
    pub use crate::frame::{CanFrame, TimestampedFrame};
    pub use crate::session::{
        BlockStorage, DirectoryStorage, LogFile, MonotonicClock, SessionStart, SystemClock,
        TimeSource,
    };
    pub use crate::signal::{extract_be_lsb, extract_be_lsb_signed, extract_le, sign_extend};
    pub use crate::unit_conversion::Unit;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
