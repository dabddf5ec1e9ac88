//! `file` and `template`
//!
//! Both resolve names against the directory of the `.hops` file that declares
//! the block being evaluated, using the file set captured at load time.

use minijinja::Environment;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use super::str_arg;
use crate::context::{Function, FunctionTable};
use crate::value::type_name;

/// Loaded automation files keyed by their slash-separated relative path
pub type Files = BTreeMap<String, Vec<u8>>;

/// Build `file` and `template` bound to `files` and `dir`
pub fn stateful_functions(files: Arc<Files>, dir: impl Into<String>) -> FunctionTable {
    let dir: Arc<str> = Arc::from(dir.into());
    let mut table = FunctionTable::new();

    let (file_files, file_dir) = (files.clone(), dir.clone());
    table.insert("file".into(), Function::new(1, move |args| {
        let name = str_arg(args, 0)?;
        read_file(&file_files, &file_dir, &name).map(Value::String)
    }));

    table.insert("template".into(), Function::new(2, move |args| {
        let name = str_arg(args, 0)?;
        let vars = match &args[1] {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(format!(
                    "variables must be key value pairs, got {}",
                    type_name(other)
                ))
            }
        };
        render_template(&files, &dir, &name, &vars).map(Value::String)
    }));

    table
}

/// Contents of `name` relative to `dir`; an empty name reads as empty
pub fn read_file(files: &Files, dir: &str, name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Ok(String::new());
    }
    let path = join_path(dir, name);
    match files.get(&path) {
        Some(content) => Ok(String::from_utf8_lossy(content).into_owned()),
        None => Err(format!("File {} not found", path)),
    }
}

/// Render a Jinja template from `files`
///
/// When `vars.autoescape` is `true` the output is HTML-escaped.
pub fn render_template(
    files: &Files,
    dir: &str,
    name: &str,
    vars: &Map<String, Value>,
) -> Result<String, String> {
    if name.is_empty() {
        return Err("Filename must be provided".to_string());
    }
    let mut source = read_file(files, dir, name)?;
    trace!(dir, name, "Rendering template");
    if vars.get("autoescape") == Some(&Value::Bool(true)) {
        source = format!("{{% autoescape true %}}{}{{% endautoescape %}}", source);
    }

    let env = Environment::new();
    env.render_str(&source, vars)
        .map_err(|e| format!("template {}: {}", name, e))
}

/// Join and normalise slash-separated paths, resolving `.` and `..`
fn join_path(dir: &str, name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(name.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn files() -> Arc<Files> {
        let mut files = Files::new();
        files.insert("deploy/notes.txt".into(), b"release notes".to_vec());
        files.insert("deploy/body.html".into(), b"<p>{{ name }}</p>".to_vec());
        files.insert("shared/header.txt".into(), b"header".to_vec());
        Arc::new(files)
    }

    fn call(table: &FunctionTable, name: &str, args: &[Value]) -> Result<Value, crate::EvalError> {
        table[name].call(name, args)
    }

    #[test]
    fn test_file_is_relative_to_declaring_dir() {
        let table = stateful_functions(files(), "deploy");
        assert_eq!(call(&table, "file", &[json!("notes.txt")]).unwrap(), json!("release notes"));
        assert_eq!(
            call(&table, "file", &[json!("../shared/header.txt")]).unwrap(),
            json!("header")
        );
        assert_eq!(call(&table, "file", &[json!("")]).unwrap(), json!(""));
        assert!(call(&table, "file", &[json!("missing.txt")]).is_err());
    }

    #[test]
    fn test_template_renders_variables() {
        let table = stateful_functions(files(), "deploy");
        let out = call(&table, "template", &[json!("body.html"), json!({"name": "<b>x</b>"})]).unwrap();
        assert_eq!(out, json!("<p><b>x</b></p>"));
    }

    #[test]
    fn test_template_autoescape() {
        let table = stateful_functions(files(), "deploy");
        let out = call(
            &table,
            "template",
            &[json!("body.html"), json!({"name": "<i>", "autoescape": true})],
        )
        .unwrap();
        assert_eq!(out, json!("<p>&lt;i&gt;</p>"));
    }

    #[test]
    fn test_template_requires_a_filename() {
        let table = stateful_functions(files(), "deploy");
        assert!(call(&table, "template", &[json!(""), json!({})]).is_err());
        assert!(call(&table, "template", &[json!("body.html"), json!([1])]).is_err());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("a", "b/c.txt"), "a/b/c.txt");
        assert_eq!(join_path("a", "./c.txt"), "a/c.txt");
        assert_eq!(join_path("a/b", "../c.txt"), "a/c.txt");
    }
}
