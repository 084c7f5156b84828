//! Log Sessions
//!
//! Everything a logging session needs from the outside world: a storage
//! medium, a time source, a file name, and the clock pair that anchors
//! record timestamps to calendar time.

mod clock;
mod naming;
mod storage;

pub use clock::{MonotonicClock, SystemClock, TimeSource, MIN_VALID_YEAR};
pub use naming::{choose_file_name, sequential_name, timestamped_name, MAX_COLLISION_SUFFIX};
pub use storage::{BlockStorage, DirectoryStorage, LogFile};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Clock readings captured once when a session starts.
///
/// A record stamped `ts` on the monotonic clock happened at
/// `unix_us + (ts - monotonic_us)` calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStart {
    /// Microseconds since the Unix epoch, 0 when the wall clock is not valid
    pub unix_us: i64,
    /// Monotonic microseconds at the same instant
    pub monotonic_us: i64,
}

impl SessionStart {
    /// Sample both clocks
    pub fn capture(clock: &dyn TimeSource) -> Self {
        let monotonic_us = clock.now_monotonic_us();
        let unix_us = clock
            .wall_clock_now()
            .filter(|_| clock.wall_clock_valid())
            .and_then(local_to_unix_us)
            .unwrap_or(0);
        Self {
            unix_us,
            monotonic_us,
        }
    }

    /// Whether the session has a calendar anchor
    pub fn has_wall_clock(&self) -> bool {
        self.unix_us != 0
    }

    /// Calendar time of a record in Unix microseconds.
    ///
    /// Records stamped before the session started map to the session start.
    pub fn absolute_us(&self, timestamp_us: i64) -> Option<i64> {
        if !self.has_wall_clock() {
            return None;
        }
        let delta = timestamp_us.saturating_sub(self.monotonic_us).max(0);
        Some(self.unix_us.saturating_add(delta))
    }

    /// Local calendar time of a record
    pub fn local_datetime(&self, timestamp_us: i64) -> Option<NaiveDateTime> {
        let absolute = self.absolute_us(timestamp_us)?;
        let utc = DateTime::from_timestamp_micros(absolute)?;
        Some(utc.with_timezone(&Local).naive_local())
    }
}

/// Interpret a local wall-clock reading as Unix microseconds
fn local_to_unix_us(local: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.timestamp_micros())
}
