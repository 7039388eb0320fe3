//! Conversions between host values and SQLite storage classes.
//!
//! SQLite has no boolean or date type. This module owns the conventions used
//! for both:
//!
//! - booleans are stored as `INTEGER` `1`/`0` and read back as `value != 0`
//! - timestamps are stored as UTC `TEXT` in [`TIMESTAMP_FORMAT`]
//!   (`YYYY-MM-DD HH:MM:SS.SSS`), which sorts lexicographically in time order
//!   and is understood by SQLite's own date functions
//!
//! Reads never fail. A NULL column decodes to the semantic default for the
//! requested type (`false`, `0`, `0.0`, `None`), and values stored under a
//! different storage class are coerced the way `sqlite3_column_*` would.
//! Malformed timestamp text decodes to `None`.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};

/// `chrono` format string for stored timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Formats accepted when decoding timestamps. Fractional seconds are
/// optional, and the ISO-8601 `T` separator is tolerated for rows written by
/// other tools.
const TIMESTAMP_READ_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A value that can be bound to a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Stored as `INTEGER` 0/1.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Stored as `TEXT` in [`TIMESTAMP_FORMAT`].
    Timestamp(DateTime<Utc>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Bool(v) => ToSqlOutput::from(encode_bool(*v)),
            Self::Integer(v) => ToSqlOutput::from(*v),
            Self::Real(v) => ToSqlOutput::from(*v),
            Self::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Self::Timestamp(v) => ToSqlOutput::from(encode_timestamp(v)),
        })
    }
}

/// Encodes a boolean as its stored integer.
pub fn encode_bool(value: bool) -> i64 {
    i64::from(value)
}

/// Encodes a timestamp as stored text, truncated to milliseconds.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// let ts = Utc.with_ymd_and_hms(2012, 3, 4, 5, 6, 7).unwrap();
/// assert_eq!(sqlkeep::codec::encode_timestamp(&ts), "2012-03-04 05:06:07.000");
/// ```
pub fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses stored timestamp text. Returns `None` for text in any other shape.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    TIMESTAMP_READ_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Decodes a column as a boolean. NULL reads as `false`.
pub fn decode_bool(value: ValueRef<'_>) -> bool {
    match value {
        ValueRef::Real(f) => f != 0.0,
        other => decode_int(other) != 0,
    }
}

/// Decodes a column as an integer. NULL reads as `0`.
pub fn decode_int(value: ValueRef<'_>) -> i64 {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => 0,
        ValueRef::Integer(i) => i,
        ValueRef::Real(f) => f as i64,
        ValueRef::Text(t) => {
            let text = String::from_utf8_lossy(t);
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
    }
}

/// Decodes a column as a float. NULL reads as `0.0`.
pub fn decode_real(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => 0.0,
        ValueRef::Integer(i) => i as f64,
        ValueRef::Real(f) => f,
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().parse().unwrap_or(0.0),
    }
}

/// Decodes a column as text. NULL reads as `None`, so it stays distinct from
/// an empty string.
pub fn decode_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Decodes a column as a timestamp. NULL and unparseable text read as `None`.
pub fn decode_timestamp(value: ValueRef<'_>) -> Option<DateTime<Utc>> {
    match value {
        ValueRef::Text(t) => {
            let text = String::from_utf8_lossy(t);
            let parsed = parse_timestamp(&text);
            if parsed.is_none() {
                tracing::debug!(text = %text, "Ignoring malformed timestamp column");
            }
            parsed
        }
        _ => None,
    }
}
