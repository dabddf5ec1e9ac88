//! Function library
//!
//! The stateless library is built once and shared between every scope.
//! `file` and `template` close over the loaded files and the declaring
//! directory, so [`stateful_functions`] builds them per block.

mod collections;
mod datetime;
mod encoding;
mod glob;
mod logic;
mod numeric;
mod stateful;
mod strings;
mod types;
mod version;

use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};

use crate::context::{FuncResult, FunctionTable};
use crate::value::{as_bool, as_number, as_string, type_name};

pub use glob::{glob_match, xglob_match};
pub use stateful::{read_file, render_template, stateful_functions, Files};
pub use version::template_version;

static STATELESS: OnceLock<Arc<FunctionTable>> = OnceLock::new();

/// The shared table of pure functions
pub fn stateless_functions() -> Arc<FunctionTable> {
    STATELESS
        .get_or_init(|| {
            let mut table = FunctionTable::new();
            numeric::register(&mut table);
            strings::register(&mut table);
            collections::register(&mut table);
            types::register(&mut table);
            logic::register(&mut table);
            encoding::register(&mut table);
            datetime::register(&mut table);
            glob::register(&mut table);
            version::register(&mut table);
            Arc::new(table)
        })
        .clone()
}

// Argument helpers. Library functions report bad input as plain messages.

pub(crate) fn str_arg(args: &[Value], i: usize) -> Result<String, String> {
    let value = &args[i];
    as_string(value).ok_or_else(|| mismatch(i, "string", value))
}

pub(crate) fn num_arg(args: &[Value], i: usize) -> Result<f64, String> {
    let value = &args[i];
    as_number(value).ok_or_else(|| mismatch(i, "number", value))
}

pub(crate) fn int_arg(args: &[Value], i: usize) -> Result<i64, String> {
    let n = num_arg(args, i)?;
    if n.fract() != 0.0 {
        return Err(format!("argument {} must be a whole number, got {}", i + 1, n));
    }
    Ok(n as i64)
}

pub(crate) fn bool_arg(args: &[Value], i: usize) -> Result<bool, String> {
    let value = &args[i];
    as_bool(value).ok_or_else(|| mismatch(i, "bool", value))
}

pub(crate) fn list_arg(args: &[Value], i: usize) -> Result<&Vec<Value>, String> {
    match &args[i] {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(i, "list", other)),
    }
}

pub(crate) fn map_arg(args: &[Value], i: usize) -> Result<&Map<String, Value>, String> {
    match &args[i] {
        Value::Object(map) => Ok(map),
        other => Err(mismatch(i, "map", other)),
    }
}

pub(crate) fn num_value(n: f64) -> FuncResult {
    crate::value::number(n).map_err(|e| e.to_string())
}

fn mismatch(i: usize, expected: &str, found: &Value) -> String {
    format!(
        "argument {} must be a {}, got {}",
        i + 1,
        expected,
        type_name(found)
    )
}
