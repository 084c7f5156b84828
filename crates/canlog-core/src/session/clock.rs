//! Time sources
//!
//! The logger needs two clocks: a monotonic microsecond counter used to
//! stamp frames, and an optional calendar clock used for file names and
//! CSV datetimes.

use std::time::Instant;

use chrono::{Datelike, Local, NaiveDateTime};

/// Calendar readings before this year mean the clock was never set
pub const MIN_VALID_YEAR: i32 = 2024;

/// Source of monotonic and wall-clock time
pub trait TimeSource: Send + Sync {
    /// Microseconds on a clock that never goes backwards
    fn now_monotonic_us(&self) -> i64;

    /// Current local wall-clock time, if there is a calendar clock
    fn wall_clock_now(&self) -> Option<NaiveDateTime>;

    /// Whether the wall clock holds a plausible time
    fn wall_clock_valid(&self) -> bool {
        self.wall_clock_now()
            .is_some_and(|now| now.year() >= MIN_VALID_YEAR)
    }
}

/// Host clocks: monotonic time since construction, local wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose monotonic time starts now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now_monotonic_us(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX)
    }

    fn wall_clock_now(&self) -> Option<NaiveDateTime> {
        Some(Local::now().naive_local())
    }
}

/// A clock without a calendar, as on a board whose RTC is missing
#[derive(Debug, Clone, Default)]
pub struct MonotonicClock {
    inner: SystemClock,
}

impl MonotonicClock {
    /// Clock whose monotonic time starts now
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSource for MonotonicClock {
    fn now_monotonic_us(&self) -> i64 {
        self.inner.now_monotonic_us()
    }

    fn wall_clock_now(&self) -> Option<NaiveDateTime> {
        None
    }
}
