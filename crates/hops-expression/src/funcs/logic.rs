//! `alltrue`, `anytrue` and `env`
//!
//! `can` and `try` need their arguments unevaluated and live in the evaluator.

use serde_json::Value;

use super::{bool_arg, str_arg};
use crate::context::{Function, FunctionTable};

pub(super) fn register(table: &mut FunctionTable) {
    // Both are false when called without clauses
    table.insert("alltrue".into(), Function::variadic(0, |args| {
        if args.is_empty() {
            return Ok(Value::Bool(false));
        }
        for i in 0..args.len() {
            if !bool_arg(args, i)? {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    }));
    table.insert("anytrue".into(), Function::variadic(0, |args| {
        for i in 0..args.len() {
            if bool_arg(args, i)? {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    }));
    table.insert("env".into(), Function::new(2, |args| {
        let name = str_arg(args, 0)?;
        match std::env::var(&name) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => Ok(Value::String(str_arg(args, 1)?)),
        }
    }));
}
