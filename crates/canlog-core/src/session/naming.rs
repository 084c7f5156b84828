//! Log file naming
//!
//! With a valid wall clock files are named `{PREFIX}_{YYYYMMDD_HHMMSS}.{EXT}`,
//! with `_01` to `_99` appended when several sessions start within the same
//! second. Without one, files are numbered `{PREFIX}_{NNNN}.{EXT}`, one past
//! the highest number already on the medium.

use std::io;

use chrono::NaiveDateTime;

use super::clock::TimeSource;
use super::storage::BlockStorage;

/// Highest collision suffix tried before giving up
pub const MAX_COLLISION_SUFFIX: u32 = 99;

/// Name for a session started at `now`, or `None` when every suffix is taken
pub fn timestamped_name(
    prefix: &str,
    extension: &str,
    now: NaiveDateTime,
    exists: impl Fn(&str) -> bool,
) -> Option<String> {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let base = format!("{prefix}_{stamp}.{extension}");
    if !exists(&base) {
        return Some(base);
    }
    (1..=MAX_COLLISION_SUFFIX)
        .map(|n| format!("{prefix}_{stamp}_{n:02}.{extension}"))
        .find(|name| !exists(name))
}

/// Sequence number of `name` if it is `{prefix}_{digits}.{extension}`
fn sequence_number(name: &str, prefix: &str, extension: &str) -> Option<u32> {
    let head = name.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = name[prefix.len()..].strip_prefix('_')?;
    let (number, ext) = rest.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case(extension) {
        return None;
    }
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// Next numbered name given the files already present
pub fn sequential_name<S: AsRef<str>>(prefix: &str, extension: &str, entries: &[S]) -> String {
    let next = entries
        .iter()
        .filter_map(|name| sequence_number(name.as_ref(), prefix, extension))
        .max()
        .map_or(1, |highest| highest.saturating_add(1));
    format!("{prefix}_{next:04}.{extension}")
}

/// Pick a fresh file name on `storage` using whichever clock is available
pub fn choose_file_name(
    storage: &dyn BlockStorage,
    clock: &dyn TimeSource,
    prefix: &str,
    extension: &str,
) -> io::Result<String> {
    match clock.wall_clock_now() {
        Some(now) if clock.wall_clock_valid() => {
            timestamped_name(prefix, extension, now, |name| storage.exists(name)).ok_or_else(
                || {
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("no free file name for {prefix} at {now}"),
                    )
                },
            )
        }
        _ => {
            let entries = storage.entries()?;
            Ok(sequential_name(prefix, extension, &entries))
        }
    }
}
