//! Logger Configuration
//!
//! Settings for the capture/writer pipeline, stored as JSON. Every field has
//! a default so a partial file (or `{}`) is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datalog::LogFormat;

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for this structure
    #[error("Parse error: {0}")]
    Parse(String),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default ring capacity, 1024 frames
pub const DEFAULT_RING_BUFFER_BYTES: usize = 32 * 1024;
/// Default write buffer for binary logs
pub const DEFAULT_BINARY_WRITE_BUFFER: usize = 64 * 1024;
/// Default write buffer for CSV logs
pub const DEFAULT_CSV_WRITE_BUFFER: usize = 8 * 1024;

/// Pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Ring capacity in bytes, rounded up to whole slots
    pub ring_buffer_bytes: usize,
    /// Write buffer size; `None` picks the default for the format
    pub write_buffer_bytes: Option<usize>,
    /// Output file format
    pub format: LogFormat,
    /// File name prefix, e.g. `CAN` for `CAN_0001.bin`
    pub file_prefix: String,
    /// Longest time records may sit in the write buffer
    pub flush_interval_ms: u64,
    /// Bounded wait for the next frame when the ring is empty
    pub idle_wait_ms: u64,
    /// Start logging as soon as the logger is initialized
    pub autostart: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: DEFAULT_RING_BUFFER_BYTES,
            write_buffer_bytes: None,
            format: LogFormat::Binary,
            file_prefix: "CAN".to_string(),
            flush_interval_ms: 1000,
            idle_wait_ms: 20,
            autostart: false,
        }
    }
}

impl LoggerConfig {
    /// Write buffer size after applying the format default
    pub fn effective_write_buffer(&self) -> usize {
        self.write_buffer_bytes.unwrap_or(match self.format {
            LogFormat::Binary => DEFAULT_BINARY_WRITE_BUFFER,
            LogFormat::Csv => DEFAULT_CSV_WRITE_BUFFER,
        })
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings the logger cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_buffer_bytes == 0 {
            return Err(ConfigError::Invalid("ring_buffer_bytes must be > 0".into()));
        }
        let min_write = self.format.max_record_len();
        if self.effective_write_buffer() < min_write {
            return Err(ConfigError::Invalid(format!(
                "write buffer must hold at least one {} record ({} bytes)",
                self.format.extension(),
                min_write
            )));
        }
        if self.file_prefix.is_empty()
            || self.file_prefix.contains(['_', '/', '\\', '.'])
        {
            return Err(ConfigError::Invalid(format!(
                "file_prefix {:?} must be non-empty and free of '_', '.' and path separators",
                self.file_prefix
            )));
        }
        if self.flush_interval_ms == 0 || self.idle_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "flush_interval_ms and idle_wait_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
