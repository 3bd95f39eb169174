//! Semantic comparison of records echoed back by the system under test
//!
//! Servers re-serialize what they store: prices come back as numbers or
//! strings, dates gain a time and zone suffix, times gain seconds. Values are
//! normalized before comparison:
//!
//! 1. numbers, and strings that parse fully as a finite decimal, become a
//!    fixed-point string with two fractional digits (`150.5` → `"150.50"`)
//! 2. UTC datetimes (`2025-12-25T00:00:00.000Z`) become their date
//!    (`2025-12-25`)
//! 3. `HH:MM:SS` times become `HH:MM`
//! 4. anything else is left unchanged
//!
//! Normalization is idempotent.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

/// A record as exchanged with the target API: field name to JSON value.
pub type Record = Map<String, Value>;

/// Canonical value used for comparison. Rule outputs are JSON strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedValue(Value);

impl NormalizedValue {
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Normalize a single value.
pub fn normalize(value: &Value) -> NormalizedValue {
    let normalized = match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| format!("{f:.2}")),
        Value::String(s) => normalize_str(s),
        _ => None,
    };
    NormalizedValue(normalized.map_or_else(|| value.clone(), Value::String))
}

fn normalize_str(s: &str) -> Option<String> {
    if let Some(number) = parse_decimal(s) {
        return Some(format!("{number:.2}"));
    }
    if let Some(date) = utc_datetime_date(s) {
        return Some(date.to_string());
    }
    if is_clock_time(s) {
        return Some(s[..5].to_string());
    }
    None
}

/// Finite decimal spelled without surrounding whitespace. Rejects `inf`/`NaN`.
fn parse_decimal(s: &str) -> Option<f64> {
    if s.is_empty() || s.trim() != s {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Date part of a `YYYY-MM-DDT...Z` string.
fn utc_datetime_date(s: &str) -> Option<&str> {
    if !s.contains('Z') {
        return None;
    }
    let (date, _) = s.split_once('T')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(date)
}

/// `HH:MM` or `HH:MM:SS` (digits only, no range check).
fn is_clock_time(s: &str) -> bool {
    let bytes = s.as_bytes();
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    match bytes.len() {
        5 => digits(0..2) && bytes[2] == b':' && digits(3..5),
        8 => digits(0..2) && bytes[2] == b':' && digits(3..5) && bytes[5] == b':' && digits(6..8),
        _ => false,
    }
}

/// One field that differs after normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: Option<NormalizedValue>,
    pub actual: Option<NormalizedValue>,
}

/// Fields whose normalized values differ. A field absent on both sides
/// matches.
pub fn mismatches(expected: &Record, actual: &Record, fields: &[&str]) -> Vec<FieldMismatch> {
    fields
        .iter()
        .filter_map(|field| {
            let expected_value = expected.get(*field).map(normalize);
            let actual_value = actual.get(*field).map(normalize);
            (expected_value != actual_value).then(|| FieldMismatch {
                field: field.to_string(),
                expected: expected_value,
                actual: actual_value,
            })
        })
        .collect()
}

/// True when every listed field normalizes to the same value on both sides.
/// An absent `actual` is never equal.
pub fn equal(expected: &Record, actual: Option<&Record>, fields: &[&str]) -> bool {
    let Some(actual) = actual else {
        tracing::debug!("actual record is absent");
        return false;
    };

    fields
        .iter()
        .all(|field| expected.get(*field).map(normalize) == actual.get(*field).map(normalize))
}

/// [`equal`] over JSON values; a non-object `actual` counts as absent.
pub fn equal_values(expected: &Record, actual: Option<&Value>, fields: &[&str]) -> bool {
    equal(expected, actual.and_then(Value::as_object), fields)
}
