//! Value normalization service
//!
//! Turns loosely-typed upstream values into the shapes the API publishes:
//! rounded ratings, UTC timestamps and numerically coerced market rows.

use crate::types::{ExchangeRow, NUMERIC_COLUMNS};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};

/// Naive layouts accepted after RFC 3339 fails; interpreted as UTC
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Round to 2 decimals.
///
/// Rounds the exact binary value, and exact halves go to the even neighbour:
/// 4.125 -> 4.12, while 2.675 (stored just below the half) -> 2.67.
pub fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}

/// Parse a store timestamp into UTC.
///
/// Offsets are honored; timestamps without one are assumed to be UTC.
///
/// # Examples
/// ```
/// use cx_service::services::normalizer::parse_timestamp;
///
/// let ts = parse_timestamp("2024-03-01T10:00:00-05:00").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-03-01T15:00:00+00:00");
/// assert!(parse_timestamp("yesterday").is_none());
/// ```
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Coerce a value to a JSON number; anything that is not numeric becomes `null`.
pub fn coerce_number(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() => Value::Number(n.clone()),
            _ => Value::Null,
        },
        Value::String(s) => parse_number(s).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Convert the exchange `data.tab` payload into typed rows.
///
/// Every row gets the union of all columns (missing cells become `null`),
/// and the numeric columns are coerced with [`coerce_number`].
pub fn shape_rows(tab: &[Value]) -> Vec<ExchangeRow> {
    let records: Vec<&Map<String, Value>> = tab
        .iter()
        .filter_map(|row| match row.as_object() {
            Some(obj) => Some(obj),
            None => {
                tracing::warn!("skipping non-object market row: {}", row);
                None
            }
        })
        .collect();

    if records.is_empty() {
        return Vec::new();
    }

    // Column order follows first appearance
    let mut columns: Vec<&str> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    records
        .into_iter()
        .map(|record| {
            let mut row = Map::with_capacity(columns.len());
            for &column in &columns {
                let raw = record.get(column).unwrap_or(&Value::Null);
                let value = if NUMERIC_COLUMNS.contains(&column) {
                    coerce_number(raw)
                } else {
                    raw.clone()
                };
                row.insert(column.to_string(), value);
            }
            ExchangeRow(row)
        })
        .collect()
}
