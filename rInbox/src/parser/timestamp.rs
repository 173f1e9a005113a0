//! Timestamp parsing for inbound payloads.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

lazy_static! {
    static ref NUMERIC: Regex = Regex::new(r"^-?\d+(\.\d+)?$").unwrap();
    static ref NAIVE: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d{1,9})?)?$").unwrap();
}

/// Parse a timestamp from any JSON shape the server has produced.
///
/// Accepts RFC 3339 strings, naive `YYYY-MM-DD HH:MM[:SS[.f]]` strings
/// (taken as UTC), and epoch seconds or milliseconds as numbers or
/// numeric strings.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(float_epoch))
            .and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Parse a timestamp string.
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if NUMERIC.is_match(s) {
        let f: f64 = s.parse().ok()?;
        return float_epoch(f).and_then(from_epoch);
    }

    if NAIVE.is_match(s) {
        let normalized = s.replacen(' ', "T", 1);
        return ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive));
    }

    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// Casting would saturate out-of-range floats to i64 bounds.
fn float_epoch(f: f64) -> Option<i64> {
    (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f as i64)
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.unsigned_abs() > MILLIS_THRESHOLD as u64 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rfc3339_converted_to_utc() {
        let dt = parse_timestamp_str("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_naive_is_utc() {
        let a = parse_timestamp_str("2024-05-01T10:00:00").unwrap();
        let b = parse_timestamp_str("2024-05-01 10:00:00.250").unwrap();
        let c = parse_timestamp_str("2024-05-01T10:00").unwrap();
        assert_eq!(a.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(b.timestamp_millis() - a.timestamp_millis(), 250);
        assert_eq!(c, a);
    }

    #[test]
    fn test_epoch_seconds_and_millis() {
        let secs = parse_timestamp(&json!(1_714_557_600)).unwrap();
        let millis = parse_timestamp(&json!(1_714_557_600_000i64)).unwrap();
        let text = parse_timestamp(&json!("1714557600")).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, text);
    }

    #[test]
    fn test_out_of_range_epochs() {
        assert!(parse_timestamp(&json!(i64::MIN)).is_none());
        assert!(parse_timestamp(&json!(-1e30)).is_none());
        assert!(parse_timestamp(&json!("-99999999999999999999999")).is_none());
        assert!(parse_timestamp(&json!(f64::MAX)).is_none());
    }

    #[test]
    fn test_out_of_range_epoch_falls_back_to_now() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        for ts in [json!(i64::MIN), json!(-1e30), json!("-99999999999999999999999")] {
            let raw = json!({"id": 1, "thread_id": 1, "timestamp": ts});
            let msg = crate::parser::normalize_at(&raw, now);
            assert_eq!(msg.created_at, now);
        }
    }

    #[test]
    fn test_garbage() {
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
        assert!(parse_timestamp(&json!({"at": 1})).is_none());
        assert!(parse_timestamp_str("2024-13-45T99:00:00").is_none());
    }
}
