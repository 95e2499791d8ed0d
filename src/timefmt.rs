use chrono::{DateTime, TimeZone, Utc};

/// Format a millisecond timestamp as UTC string, or return a placeholder on error.
pub fn format_timestamp(ts_millis: i64) -> String {
    match Utc.timestamp_millis_opt(ts_millis) {
        chrono::LocalResult::Single(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "invalid timestamp".to_string(),
    }
}

/// Format an instant as its UTC calendar day.
pub fn format_day(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d").to_string()
}

/// Format an instant as RFC 3339 with millisecond precision.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
