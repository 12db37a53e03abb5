//! Timestamp utilities
//!
//! All timestamps are stored as RFC 3339 strings in UTC so that lexical order
//! in SQLite matches chronological order.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Canonical storage form: RFC 3339, microsecond precision, `Z` suffix
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into UTC
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Unix seconds (Chess.com `end_time`) to UTC
pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Unix milliseconds (Lichess `createdAt` / `lastMoveAt`) to UTC
pub fn from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Partition date of a timestamp (UTC calendar date)
pub fn partition_date(ts: &DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}
