//! Decoded automation blocks

use hcl::Expression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// `on <label> [name] { ... }`: a trigger for one event or event/action
#[derive(Debug, Clone, PartialEq)]
pub struct OnAst {
    pub label: String,
    pub name: Option<String>,
    pub slug: String,
    pub worker: String,
    pub if_expr: Option<Expression>,
    pub calls: Vec<CallAst>,
    pub dones: Vec<DoneAst>,
    /// Relative path of the declaring `.hops` file
    pub file_path: String,
}

impl OnAst {
    /// Directory `file()` and `template()` resolve against
    pub fn dir(&self) -> &str {
        crate::files::parent_dir(&self.file_path)
    }

    pub fn automation_dir(&self) -> &str {
        crate::files::automation_dir(&self.file_path)
    }
}

/// `call <app_handler> [name] { ... }`: one task request
#[derive(Debug, Clone, PartialEq)]
pub struct CallAst {
    pub label: String,
    pub name: Option<String>,
    pub slug: String,
    pub app: String,
    pub handler: String,
    pub if_expr: Option<Expression>,
    pub inputs_expr: Option<Expression>,
}

/// `done { completed = ..., errored = ... }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DoneAst {
    pub completed: Option<Expression>,
    pub errored: Option<Expression>,
}

/// Outcome of evaluating `done` blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneOutcome {
    Completed,
    Errored,
    None,
}

impl DoneOutcome {
    pub fn is_done(self) -> bool {
        !matches!(self, DoneOutcome::None)
    }
}

/// `schedule <name> { cron = ..., inputs = ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleAst {
    pub name: String,
    pub cron: String,
    pub inputs_expr: Option<Expression>,
    pub file_path: String,
}

/// Declared type of a task param
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Text,
    Number,
    Bool,
}

impl ParamType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ParamType::String),
            "text" => Some(ParamType::Text),
            "number" => Some(ParamType::Number),
            "bool" => Some(ParamType::Bool),
            _ => None,
        }
    }

    /// Whether `value` has this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String | ParamType::Text => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Bool => value.is_boolean(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Text => "text",
            ParamType::Number => "number",
            ParamType::Bool => "bool",
        };
        f.write_str(s)
    }
}

/// `param <name> { ... }` inside a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAst {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub display_name: String,
    pub flag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shortflag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help: String,
    pub required: bool,
}

/// `task <name> { ... }`: an HTTP triggerable task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAst {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub summary: String,
    pub params: Vec<ParamAst>,
    pub filepath: String,
}

impl TaskAst {
    pub fn param(&self, name: &str) -> Option<&ParamAst> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Every block of an automations set plus the event index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HopsAst {
    pub ons: Vec<OnAst>,
    pub schedules: Vec<ScheduleAst>,
    pub tasks: Vec<TaskAst>,
    /// `on` label to positions in `ons`, in declaration order
    pub event_index: HashMap<String, Vec<usize>>,
}

impl HopsAst {
    pub(crate) fn push_on(&mut self, on: OnAst) {
        self.event_index
            .entry(on.label.clone())
            .or_default()
            .push(self.ons.len());
        self.ons.push(on);
    }

    /// `on` blocks indexed under `key`
    pub fn ons_for(&self, key: &str) -> impl Iterator<Item = &OnAst> {
        self.event_index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.ons.get(i))
    }
}

/// `snake_case` to `Snake Case`
pub(crate) fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
