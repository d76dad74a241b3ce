//! Timestamp parsing and display labels.

use chrono::{DateTime, FixedOffset, TimeZone, Timelike};

/// Parse an upstream ISO-8601 timestamp, keeping its offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value).ok()
}

/// `"3:00pm"`
pub fn hour_label<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let (is_pm, hour) = dt.hour12();
    format!("{}:{:02}{}", hour, dt.minute(), if is_pm { "pm" } else { "am" })
}

/// `"Mon, 10/19, 3:00pm"`
pub fn display_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}, {}", dt.format("%a, %m/%d"), hour_label(dt))
}

/// `"Mon, Oct 19"`
pub fn day_label<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%a, %b %d").to_string()
}

/// Display label for a raw upstream timestamp.
pub fn display_timestamp(value: Option<&str>) -> Option<String> {
    value.and_then(parse_timestamp).map(|dt| display_datetime(&dt))
}
