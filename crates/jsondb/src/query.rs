// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Field lookup and equality for filtered scans
//!
//! A field path is either a single field name or dot-separated segments
//! naming nested object fields; a numeric segment indexes into an array.
//! Comparison is driven by the type of the expected value, and a field of
//! another JSON type is an error, never a silent non-match.

use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::validation("missing query field"));
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::validation(format!(
                "query field '{raw}' has an empty segment"
            )));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Value a field is compared against
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// Exact JSON equality, whatever the type
    Any(Value),
}

impl Expected {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Expected::Int(_) => "integer",
            Expected::Float(_) => "number",
            Expected::String(_) => "string",
            Expected::Bool(_) => "boolean",
            Expected::Any(_) => "any",
        }
    }
}

impl From<i64> for Expected {
    fn from(v: i64) -> Self {
        Expected::Int(v)
    }
}

impl From<i32> for Expected {
    fn from(v: i32) -> Self {
        Expected::Int(i64::from(v))
    }
}

impl From<u32> for Expected {
    fn from(v: u32) -> Self {
        Expected::Int(i64::from(v))
    }
}

impl From<f64> for Expected {
    fn from(v: f64) -> Self {
        Expected::Float(v)
    }
}

impl From<f32> for Expected {
    fn from(v: f32) -> Self {
        Expected::Float(f64::from(v))
    }
}

impl From<&str> for Expected {
    fn from(v: &str) -> Self {
        Expected::String(v.to_string())
    }
}

impl From<String> for Expected {
    fn from(v: String) -> Self {
        Expected::String(v)
    }
}

impl From<bool> for Expected {
    fn from(v: bool) -> Self {
        Expected::Bool(v)
    }
}

impl From<Value> for Expected {
    fn from(v: Value) -> Self {
        Expected::Any(v)
    }
}

/// Why a field could not be compared
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("no field '{segment}'")]
    Missing { segment: String },

    #[error("index '{segment}' out of range for array of {len}")]
    OutOfRange { segment: String, len: usize },

    #[error("cannot look up '{segment}' in {found}")]
    NotTraversable { segment: String, found: &'static str },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Walk `path` through `doc`.
pub fn lookup<'a>(doc: &'a Value, path: &FieldPath) -> std::result::Result<&'a Value, FieldError> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or_else(|| FieldError::Missing {
                segment: segment.clone(),
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| FieldError::NotTraversable {
                    segment: segment.clone(),
                    found: "array",
                })?;
                items.get(index).ok_or_else(|| FieldError::OutOfRange {
                    segment: segment.clone(),
                    len: items.len(),
                })?
            }
            other => {
                return Err(FieldError::NotTraversable {
                    segment: segment.clone(),
                    found: json_type_name(other),
                });
            }
        };
    }
    Ok(current)
}

fn mismatch(expected: &Expected, found: &Value) -> FieldError {
    FieldError::TypeMismatch {
        expected: expected.type_name(),
        found: json_type_name(found),
    }
}

/// Compare a looked-up field against the expected value.
pub fn compare(found: &Value, expected: &Expected) -> std::result::Result<bool, FieldError> {
    match (expected, found) {
        (Expected::Int(want), Value::Number(n)) => Ok(int_equals(n, *want)),
        (Expected::Float(want), Value::Number(n)) => Ok(n.as_f64() == Some(*want)),
        (Expected::String(want), Value::String(s)) => Ok(s == want),
        (Expected::Bool(want), Value::Bool(b)) => Ok(b == want),
        (Expected::Any(want), value) => Ok(value == want),
        (expected, value) => Err(mismatch(expected, value)),
    }
}

/// Exact integer equality. Integers past `i64::MAX` never match, and
/// floats match only when integral and inside the `i64` range.
fn int_equals(n: &serde_json::Number, want: i64) -> bool {
    if let Some(v) = n.as_i64() {
        return v == want;
    }
    if let Some(v) = n.as_u64() {
        return u64::try_from(want).is_ok_and(|w| w == v);
    }
    // 2^63 is exactly representable, so the upper bound is exclusive
    n.as_f64().is_some_and(|f| {
        f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 && f as i64 == want
    })
}

/// Look up `path` in `doc` and compare it with `expected`.
pub fn matches(doc: &Value, path: &FieldPath, expected: &Expected) -> std::result::Result<bool, FieldError> {
    compare(lookup(doc, path)?, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(field("FName").segments(), ["FName"]);
        assert_eq!(field("a.b.c").segments(), ["a", "b", "c"]);
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
    }

    #[test]
    fn test_lookup_nested_and_arrays() {
        let doc = json!({"a": {"b": {"c": 5}}, "tags": ["x", "y"]});
        assert_eq!(lookup(&doc, &field("a.b.c")).unwrap(), &json!(5));
        assert_eq!(lookup(&doc, &field("tags.1")).unwrap(), &json!("y"));
        assert_eq!(
            lookup(&doc, &field("a.x")),
            Err(FieldError::Missing {
                segment: "x".to_string()
            })
        );
        assert!(matches!(
            lookup(&doc, &field("tags.7")),
            Err(FieldError::OutOfRange { len: 2, .. })
        ));
        assert!(matches!(
            lookup(&doc, &field("a.b.c.d")),
            Err(FieldError::NotTraversable { found: "number", .. })
        ));
    }

    #[test]
    fn test_compare_by_expected_type() {
        assert_eq!(compare(&json!(96), &Expected::from(96)), Ok(true));
        assert_eq!(compare(&json!(96), &Expected::from(69)), Ok(false));
        assert_eq!(compare(&json!(5.0), &Expected::from(5)), Ok(true));
        assert_eq!(compare(&json!(5.5), &Expected::from(5)), Ok(false));
        assert_eq!(compare(&json!(2.5), &Expected::from(2.5)), Ok(true));
        assert_eq!(compare(&json!(3), &Expected::from(3.0)), Ok(true));
        assert_eq!(compare(&json!("Phenix"), &Expected::from("Phenix")), Ok(true));
        assert_eq!(compare(&json!(true), &Expected::from(false)), Ok(false));
        assert_eq!(
            compare(&json!({"k": [1]}), &Expected::from(json!({"k": [1]}))),
            Ok(true)
        );
        assert_eq!(compare(&json!(null), &Expected::Any(Value::Null)), Ok(true));
    }

    #[test]
    fn test_mismatched_types_never_match() {
        assert_eq!(
            compare(&json!("96"), &Expected::from(96)),
            Err(FieldError::TypeMismatch {
                expected: "integer",
                found: "string"
            })
        );
        assert!(compare(&json!(1), &Expected::from(true)).is_err());
        assert!(compare(&json!(null), &Expected::from("x")).is_err());
        assert_eq!(compare(&json!("1"), &Expected::Any(json!(1))), Ok(false));
    }

    #[test]
    fn test_integers_compare_exactly_at_the_edges() {
        let max = Expected::Int(i64::MAX);
        assert_eq!(compare(&json!(i64::MAX), &max), Ok(true));
        assert_eq!(compare(&json!(1u64 << 63), &max), Ok(false));
        assert_eq!(compare(&json!(u64::MAX), &Expected::Int(-1)), Ok(false));
        assert_eq!(compare(&json!(9.223372036854775807e18), &max), Ok(false));
        assert_eq!(compare(&json!(-9.223372036854775808e18), &Expected::Int(i64::MIN)), Ok(true));
        assert_eq!(compare(&json!(1e300), &max), Ok(false));
        assert_eq!(compare(&json!(5.0), &Expected::from(5)), Ok(true));
        assert_eq!(compare(&json!(5.5), &Expected::from(5)), Ok(false));
    }

    #[test]
    fn test_matches() {
        let doc = json!({"FName": "Phenix", "Age": 96});
        assert_eq!(matches(&doc, &field("FName"), &"Phenix".into()), Ok(true));
        assert_eq!(matches(&doc, &field("Age"), &96.into()), Ok(true));
        assert!(matches(&doc, &field("LName"), &"Rizen".into()).is_err());
    }
}
