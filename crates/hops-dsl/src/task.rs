//! Validating HTTP task input against declared params

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::ast::{ParamType, TaskAst};

/// Field-level problems keyed by param name; empty when the input is valid
pub type InputErrors = BTreeMap<String, Vec<String>>;

/// Check `input` against every param of `task`
///
/// Missing params are only reported when required. Keys that are not
/// declared params are ignored.
pub fn validate_task_input(task: &TaskAst, input: &Map<String, Value>) -> InputErrors {
    let mut errors = InputErrors::new();
    for param in &task.params {
        let Some(value) = input.get(&param.name).filter(|v| !v.is_null()) else {
            if param.required {
                errors.insert(param.name.clone(), vec!["Required".to_string()]);
            }
            continue;
        };

        if !param.param_type.accepts(value) {
            let message = match param.param_type {
                ParamType::String => "Should be a string",
                ParamType::Text => "Should be text",
                ParamType::Number => "Should be a number",
                ParamType::Bool => "Should be a boolean",
            };
            errors.insert(param.name.clone(), vec![message.to_string()]);
        }
    }
    errors
}
