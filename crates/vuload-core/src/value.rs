//! Fallible, typed access into loosely-typed JSON bodies
//!
//! Paths are dotted (`data.booking.id`); numeric segments index arrays
//! (`data.bookings.0.id`).

use crate::error::ParseError;
use serde_json::{Map, Value};

/// Name of a JSON value's type, for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Path lookups on [`serde_json::Value`].
pub trait JsonPath {
    /// Value at `path`. An explicit `null` counts as absent.
    fn at(&self, path: &str) -> Result<&Value, ParseError>;

    fn str_at(&self, path: &str) -> Result<&str, ParseError> {
        let value = self.at(path)?;
        value.as_str().ok_or_else(|| mismatch(path, "string", value))
    }

    fn f64_at(&self, path: &str) -> Result<f64, ParseError> {
        let value = self.at(path)?;
        value.as_f64().ok_or_else(|| mismatch(path, "number", value))
    }

    fn i64_at(&self, path: &str) -> Result<i64, ParseError> {
        let value = self.at(path)?;
        value.as_i64().ok_or_else(|| mismatch(path, "integer", value))
    }

    fn bool_at(&self, path: &str) -> Result<bool, ParseError> {
        let value = self.at(path)?;
        value.as_bool().ok_or_else(|| mismatch(path, "bool", value))
    }

    fn array_at(&self, path: &str) -> Result<&Vec<Value>, ParseError> {
        let value = self.at(path)?;
        value.as_array().ok_or_else(|| mismatch(path, "array", value))
    }

    fn object_at(&self, path: &str) -> Result<&Map<String, Value>, ParseError> {
        let value = self.at(path)?;
        value.as_object().ok_or_else(|| mismatch(path, "object", value))
    }

    /// Identifier at `path` rendered as a string, whether the server sent it
    /// as a number or a string.
    fn id_at(&self, path: &str) -> Result<String, ParseError> {
        match self.at(path)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(mismatch(path, "string or number", other)),
        }
    }
}

impl JsonPath for Value {
    fn at(&self, path: &str) -> Result<&Value, ParseError> {
        let not_found = || ParseError::PathNotFound {
            path: path.to_string(),
        };

        let mut current = self;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(not_found)?;
        }

        if current.is_null() {
            return Err(not_found());
        }
        Ok(current)
    }
}

fn mismatch(path: &str, expected: &'static str, found: &Value) -> ParseError {
    ParseError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: type_name(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> Value {
        json!({
            "success": true,
            "data": {
                "token": "abc",
                "booking": { "id": 42, "ticket_price": "150.5" },
                "bookings": [{ "id": 1 }, { "id": 2 }],
                "deleted_booking_id": "42",
                "missing": null
            }
        })
    }

    #[test]
    fn test_typed_lookups() {
        let body = body();

        assert_eq!(body.bool_at("success"), Ok(true));
        assert_eq!(body.str_at("data.token"), Ok("abc"));
        assert_eq!(body.i64_at("data.booking.id"), Ok(42));
        assert_eq!(body.i64_at("data.bookings.1.id"), Ok(2));
        assert_eq!(body.array_at("data.bookings").map(Vec::len), Ok(2));
        assert!(body.object_at("data.booking").is_ok());
    }

    #[test]
    fn test_id_accepts_number_or_string() {
        let body = body();

        assert_eq!(body.id_at("data.booking.id"), Ok("42".to_string()));
        assert_eq!(body.id_at("data.deleted_booking_id"), Ok("42".to_string()));
    }

    #[test]
    fn test_absent_path() {
        let body = body();

        assert_eq!(
            body.str_at("data.user.name"),
            Err(ParseError::PathNotFound {
                path: "data.user.name".to_string()
            })
        );
        assert!(matches!(
            body.at("data.missing"),
            Err(ParseError::PathNotFound { .. })
        ));
        assert!(matches!(
            body.at("data.bookings.9"),
            Err(ParseError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let body = body();

        assert_eq!(
            body.f64_at("data.token"),
            Err(ParseError::TypeMismatch {
                path: "data.token".to_string(),
                expected: "number",
                found: "string",
            })
        );
    }
}
