use serde_json::{Map, Value};

use super::str_arg;
use crate::context::{FuncResult, Function, FunctionTable};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("csv".into(), Function::new(1, |args| csv_decode(&str_arg(args, 0)?)));
    table.insert("jsondecode".into(), Function::new(1, |args| {
        serde_json::from_str(&str_arg(args, 0)?).map_err(|e| format!("invalid JSON: {}", e))
    }));
    table.insert("jsonencode".into(), Function::new(1, |args| {
        serde_json::to_string(&args[0])
            .map(Value::String)
            .map_err(|e| e.to_string())
    }));
}

/// Decode CSV with a header row into a list of maps of strings
fn csv_decode(input: &str) -> FuncResult {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| format!("invalid CSV header: {}", e))?
        .clone();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("invalid CSV row {}: {}", line + 1, e))?;
        if record.len() != headers.len() {
            return Err(format!(
                "row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                headers.len()
            ));
        }
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}
