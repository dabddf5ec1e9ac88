//! Conversions between expression values
//!
//! Values are plain `serde_json::Value`s. Numbers that hold an integral value
//! are kept as integers so that they serialize without a fractional part.

use serde_json::{Number, Value};

use crate::error::{EvalError, EvalResult};

/// Human readable type name used in error messages
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "tuple",
        Value::Object(_) => "object",
    }
}

/// Build a number value, preferring an integer representation
pub fn number(n: f64) -> EvalResult<Value> {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| EvalError::InvalidArgument {
            function: "number".to_string(),
            message: format!("{} is not a finite number", n),
        })
}

/// Numeric view of a value; numeric strings convert like HCL does
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Boolean view of a value; `"true"` and `"false"` convert
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

/// String view of a primitive value
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(format_number(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Require a string, converting primitives
pub fn expect_string(value: &Value) -> EvalResult<String> {
    as_string(value).ok_or_else(|| EvalError::type_mismatch("string", value))
}

/// Require a number, converting numeric strings
pub fn expect_number(value: &Value) -> EvalResult<f64> {
    as_number(value).ok_or_else(|| EvalError::type_mismatch("number", value))
}

/// Require a bool, converting `"true"`/`"false"`
pub fn expect_bool(value: &Value) -> EvalResult<bool> {
    as_bool(value).ok_or_else(|| EvalError::type_mismatch("bool", value))
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_prefers_integers() {
        assert_eq!(number(3.0).unwrap(), json!(3));
        assert_eq!(number(1.5).unwrap(), json!(1.5));
        assert!(number(f64::NAN).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(as_number(&json!("42")), Some(42.0));
        assert_eq!(as_bool(&json!("true")), Some(true));
        assert_eq!(as_bool(&json!(1)), None);
        assert_eq!(as_string(&json!(2)), Some("2".to_string()));
        assert_eq!(as_string(&json!(2.5)), Some("2.5".to_string()));
        assert_eq!(as_string(&json!(null)), None);
    }
}
