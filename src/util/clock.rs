//! Wall-clock helpers for persisted timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one hour.
pub const HOUR_MS: u64 = 60 * 60 * 1000;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Falls back to `0` if the system clock is set before the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Current wall-clock time in whole seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> u64 {
    now_ms() / 1000
}
