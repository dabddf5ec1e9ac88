use serde_json::Value;

use super::collections::set_of;
use super::num_value;
use crate::context::{Function, FunctionTable};
use crate::value::{as_bool, as_number, as_string, type_name};

// Conversions pass null through unchanged

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("tobool".into(), Function::new(1, |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        other => as_bool(other)
            .map(Value::Bool)
            .ok_or_else(|| cannot_convert(other, "bool")),
    }));
    table.insert("tonumber".into(), Function::new(1, |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        other => match as_number(other) {
            Some(n) => num_value(n),
            None => Err(cannot_convert(other, "number")),
        },
    }));
    table.insert("tostring".into(), Function::new(1, |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        other => as_string(other)
            .map(Value::String)
            .ok_or_else(|| cannot_convert(other, "string")),
    }));
    table.insert("tolist".into(), Function::new(1, |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => Ok(Value::Array(items.clone())),
        other => Err(cannot_convert(other, "list")),
    }));
    table.insert("toset".into(), Function::new(1, |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => Ok(Value::Array(set_of(items))),
        other => Err(cannot_convert(other, "set")),
    }));
    table.insert("tomap".into(), Function::new(1, |args| match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Object(map) => Ok(Value::Object(map.clone())),
        other => Err(cannot_convert(other, "map")),
    }));
}

fn cannot_convert(value: &Value, target: &str) -> String {
    format!("cannot convert {} to {}", type_name(value), target)
}

#[cfg(test)]
mod tests {
    use crate::funcs::stateless_functions;
    use serde_json::{json, Value};

    fn call(name: &str, args: &[Value]) -> Result<Value, crate::EvalError> {
        stateless_functions()[name].call(name, args)
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("tobool", &[json!("true")]).unwrap(), json!(true));
        assert_eq!(call("tonumber", &[json!("12")]).unwrap(), json!(12));
        assert_eq!(call("tostring", &[json!(1.5)]).unwrap(), json!("1.5"));
        assert_eq!(call("toset", &[json!(["a", "a", "b"])]).unwrap(), json!(["a", "b"]));
        assert_eq!(call("tolist", &[json!(null)]).unwrap(), json!(null));
        assert_eq!(call("tomap", &[json!({"a": 1})]).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_bad_conversions() {
        assert!(call("tobool", &[json!("yes")]).is_err());
        assert!(call("tonumber", &[json!("abc")]).is_err());
        assert!(call("tostring", &[json!([1])]).is_err());
        assert!(call("tomap", &[json!([1])]).is_err());
    }
}
