//! Coercion of loosely-typed scraped JSON into [`RawMessage`].
//!
//! Values that cannot be interpreted become `None`. Nothing is defaulted to
//! zero or `false`, so "unknown" stays distinguishable from real data.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use medwh_core::RawMessage;
use serde_json::Value;

use crate::error::IngestError;

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Normalize one scraped message object.
///
/// `message_id` and `channel_name` are required; every other key is optional
/// and coerced independently.
///
/// # Errors
///
/// Returns [`IngestError::MissingKey`] or [`IngestError::InvalidKey`] when a
/// required key is absent or unusable.
pub fn normalize_message(record: &Value) -> Result<RawMessage, IngestError> {
    let message_id = match record.get("message_id") {
        None | Some(Value::Null) => return Err(IngestError::MissingKey { key: "message_id" }),
        Some(raw) => coerce_i64(raw).ok_or_else(|| IngestError::InvalidKey {
            key: "message_id",
            value: raw.to_string(),
        })?,
    };

    let channel_name = match record.get("channel_name") {
        None | Some(Value::Null) => return Err(IngestError::MissingKey { key: "channel_name" }),
        Some(raw) => coerce_string(raw)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IngestError::InvalidKey {
                key: "channel_name",
                value: raw.to_string(),
            })?,
    };

    let field = |key: &str| record.get(key).filter(|v| !v.is_null());

    Ok(RawMessage {
        message_id,
        channel_name,
        message_date: field("message_date").and_then(parse_timestamp),
        message_text: field("message_text").and_then(coerce_string),
        has_media: field("has_media").and_then(coerce_bool),
        image_path: field("image_path")
            .and_then(coerce_string)
            .filter(|s| !s.trim().is_empty()),
        views: field("views").and_then(coerce_i32),
        forwards: field("forwards").and_then(coerce_i32),
        is_reply: field("is_reply").and_then(coerce_bool),
        reply_to_msg_id: field("reply_to_msg_id").and_then(coerce_i64),
        scraped_at: field("scraped_at").and_then(parse_timestamp),
    })
}

/// Parse a timestamp value into UTC.
///
/// Accepts RFC 3339, ISO-like date-times with a space or `T` separator (with
/// or without an offset; naive values are taken as UTC) and bare dates.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce a JSON value to an integer.
///
/// Integers, integral floats (`42.0`) and numeric strings are accepted.
#[must_use]
pub fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral_f64)),
        Value::String(s) => parse_int_str(s),
        _ => None,
    }
}

#[must_use]
pub fn coerce_i32(value: &Value) -> Option<i32> {
    coerce_i64(value).and_then(|v| i32::try_from(v).ok())
}

/// Coerce a JSON value to a boolean: JSON bools, `0`/`1`, and the strings
/// `true`/`false`/`1`/`0` (case-insensitive).
#[must_use]
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Parse a trimmed string as an integer, accepting integral decimals such as
/// `"123.0"` the way spreadsheet exports often write them.
#[must_use]
pub fn parse_int_str(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().and_then(integral_f64))
}

/// Parse a trimmed string as a finite float.
#[must_use]
pub fn parse_float_str(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integral_f64(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
