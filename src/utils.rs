use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current wall-clock time in microseconds since the Unix epoch.
///
/// All timestamps inside the core (orders, trades, journal entries) are
/// expressed in this unit.
#[must_use]
pub fn current_time_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Returns the UTC day number for a microsecond timestamp.
///
/// Used by the risk engine to roll daily loss counters at midnight UTC.
#[must_use]
#[inline]
pub fn utc_day(ts_micros: u64) -> u64 {
    ts_micros / 86_400_000_000
}
