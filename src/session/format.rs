//! Display helpers for durations and timestamps

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

/// Render as `H時間M分S秒`, truncating sub-second precision.
/// Negative durations render as zero.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{}時間{}分{}秒", hours, minutes, seconds)
}

/// Render a timestamp in the given UTC offset, e.g. `2024-03-01 21:05:00`
pub fn format_timestamp(time: DateTime<Utc>, utc_offset_minutes: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
        .unwrap_or_else(|| Utc.fix());
    time.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
