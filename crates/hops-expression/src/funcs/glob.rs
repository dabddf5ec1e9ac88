//! Glob matching for `glob` and `xglob`
//!
//! `*` and `?` stay within a path segment, `**` crosses `/`, `[...]` is a
//! character class and `\` escapes the next character.

use globset::GlobBuilder;
use serde_json::Value;

use crate::context::{Function, FunctionTable};
use crate::value::{as_string, type_name};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("glob".into(), Function::new(2, |args| {
        glob_match(&args[0], &args[1]).map(Value::Bool)
    }));
    table.insert("xglob".into(), Function::new(2, |args| {
        xglob_match(&args[0], &args[1]).map(Value::Bool)
    }));
}

/// True when any value matches any pattern
pub fn glob_match(values: &Value, patterns: &Value) -> Result<bool, String> {
    if values.is_null() || patterns.is_null() {
        return Ok(false);
    }
    for pattern in strings(patterns)? {
        for value in strings(values)? {
            if matches_one(&pattern, &value)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// True when every value matches every pattern
pub fn xglob_match(values: &Value, patterns: &Value) -> Result<bool, String> {
    if values.is_null() || patterns.is_null() {
        return Ok(false);
    }
    for pattern in strings(patterns)? {
        for value in strings(values)? {
            if !matches_one(&pattern, &value)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn strings(value: &Value) -> Result<Vec<String>, String> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    items
        .iter()
        .map(|item| {
            as_string(item).ok_or_else(|| format!("glob expects strings, got {}", type_name(item)))
        })
        .collect()
}

fn matches_one(pattern: &str, value: &str) -> Result<bool, String> {
    if pattern.is_empty() || value.is_empty() {
        return Ok(false);
    }
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|e| format!("invalid glob pattern \"{}\": {}", pattern, e))?;
    Ok(glob.compile_matcher().is_match(value))
}
