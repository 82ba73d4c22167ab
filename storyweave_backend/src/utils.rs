//! Shared helpers and constants.

use chrono::Utc;

pub const APP_NAME: &str = "storyweave_backend";

/// Current wall-clock time as Unix seconds. Only host-facing entry points
/// call this; forest construction never reads the clock.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

pub fn format_unix(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
