use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::geo::Coordinate;
use crate::models::{ReportPriority, ReportStatus};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<ReportStatus> {
    match value {
        "pending" => Ok(ReportStatus::Pending),
        "in_progress" => Ok(ReportStatus::InProgress),
        "resolved" => Ok(ReportStatus::Resolved),
        "rejected" => Ok(ReportStatus::Rejected),
        other => Err(anyhow!("unknown report status {other}")),
    }
}

pub fn parse_priority(value: &str) -> Result<ReportPriority> {
    match value {
        "low" => Ok(ReportPriority::Low),
        "medium" => Ok(ReportPriority::Medium),
        "high" => Ok(ReportPriority::High),
        "urgent" => Ok(ReportPriority::Urgent),
        other => Err(anyhow!("unknown report priority {other}")),
    }
}

/// Decode the `location` column into a coordinate.
///
/// Accepts `{"lat": .., "lng": ..}` with numbers or numeric strings. Anything
/// else (missing column, bad JSON, missing keys, out-of-range values) is
/// `None`: plenty of legacy rows simply have no geodata.
pub fn decode_location(raw: Option<&str>) -> Option<Coordinate> {
    let value: Value = serde_json::from_str(raw?).ok()?;
    let latitude = numeric_field(&value, "lat")?;
    let longitude = numeric_field(&value, "lng")?;
    Coordinate::new(latitude, longitude)
}

fn numeric_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numbers_and_numeric_strings() {
        let point = decode_location(Some(r#"{"lat": 19.33, "lng": -99.18}"#)).unwrap();
        assert_eq!(point.latitude(), 19.33);

        let point = decode_location(Some(r#"{"lat": "19.33", "lng": " -99.18 "}"#)).unwrap();
        assert_eq!(point.longitude(), -99.18);
    }

    #[test]
    fn anything_else_is_missing_geodata() {
        assert!(decode_location(None).is_none());
        assert!(decode_location(Some("")).is_none());
        assert!(decode_location(Some("not json")).is_none());
        assert!(decode_location(Some(r#"{"lat": 1.0}"#)).is_none());
        assert!(decode_location(Some(r#"{"lat": "north", "lng": 2.0}"#)).is_none());
        assert!(decode_location(Some(r#"{"lat": null, "lng": 2.0}"#)).is_none());
        assert!(decode_location(Some(r#"{"lat": 95.0, "lng": 2.0}"#)).is_none());
        assert!(decode_location(Some("[1.0, 2.0]")).is_none());
    }

    #[test]
    fn parses_known_enums_only() {
        assert_eq!(parse_status("in_progress").unwrap(), ReportStatus::InProgress);
        assert!(parse_status("Closed").is_err());
        assert_eq!(parse_priority("urgent").unwrap(), ReportPriority::Urgent);
        assert!(parse_priority("critical").is_err());
    }
}
