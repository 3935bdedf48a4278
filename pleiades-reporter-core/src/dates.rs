//! Parse and format the dates that upstream services hand back.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Format used when listing reports at the prompt.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Error, PartialEq)]
#[error("Unrecognised date/time value: '{0}'")]
pub struct DateError(pub String);

/// Parse an RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` value
/// into a UTC datetime. Values without an offset are taken to be UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DateError> {
    let value = s.trim();
    let parsed = DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|date| Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()))
        })
        .map_err(|_| DateError(value.to_string()))?;
    Ok(clamp_leap_second(parsed))
}

/// chrono represents `:60` as second 59 with an oversized nanosecond field;
/// fold it back so a leap second reads as `:59`.
fn clamp_leap_second(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond();
    if nanos >= 1_000_000_000 {
        dt.with_nanosecond(nanos - 1_000_000_000).unwrap_or(dt)
    } else {
        dt
    }
}

pub fn format_listing(dt: &DateTime<Utc>) -> String {
    dt.format(DEFAULT_DATETIME_FORMAT).to_string()
}

/// The earliest moment anything can have happened: 1970-01-01T00:00:00Z.
pub fn dawn_of_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// The latest moment we schedule or cache anything for: 9999-12-31T23:59:59Z.
pub fn end_of_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now + delta`, capped at [`end_of_time`].
pub fn later_by(now: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    let end = end_of_time();
    now.checked_add_signed(delta)
        .filter(|when| *when < end)
        .unwrap_or(end)
}
