// src/core/utils/time.rs

//! Time helpers for cache headers and bandwidth bucketing. All formatting is
//! in UTC so that cells and headers are stable across node time zones.

use chrono::{DateTime, TimeZone, Utc};

/// Seconds per bandwidth cell (5 minutes).
pub const SLOT_SECONDS: i64 = 300;

/// Current unix time in seconds.
pub fn unix_time() -> i64 {
    Utc::now().timestamp()
}

/// Formats a unix timestamp as an HTTP date, e.g.
/// `Tue, 14 Nov 2023 22:13:20 GMT`.
pub fn format_gmt(unix: i64) -> String {
    let t = Utc
        .timestamp_opt(unix, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Formats the day component of a bandwidth cell key, e.g. `20231114`.
pub fn format_day(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

/// Formats a unix timestamp as `HHMM`, floored to the 5-minute slot, e.g.
/// a timestamp inside 22:13 becomes `2210`.
pub fn format_time_slot(unix: i64) -> String {
    let floored = unix / SLOT_SECONDS * SLOT_SECONDS;
    let t = Utc
        .timestamp_opt(floored, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    t.format("%H%M").to_string()
}
