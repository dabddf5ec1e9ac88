//! Decoding `.hops` bodies into blocks
//!
//! Structural problems (unknown blocks or arguments, bad labels, duplicate
//! slugs, bad cron, bad param types) become error diagnostics. Expressions
//! that depend on runtime variables are kept unevaluated.

use hcl::{Attribute, Block, Body, Expression, Structure};
use hops_core::{is_reserved_message_id, slugify, slugify_parts};
use hops_expression::{type_name, EvalContext};
use serde_json::Value;
use std::collections::HashSet;
use tracing::trace;

use crate::ast::{
    title_case, CallAst, DoneAst, HopsAst, OnAst, ParamAst, ParamType, ScheduleAst, TaskAst,
};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::files::automation_dir;
use crate::schedule::parse_cron;
use crate::validate::validate_label;

const DEFAULT_WORKER: &str = "handle";
const DEFAULT_HANDLER: &str = "handle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlockKind {
    On,
    Call,
    Task,
    Schedule,
    Param,
}

impl BlockKind {
    fn duplicate_summary(self) -> &'static str {
        match self {
            BlockKind::On => "Duplicate on block",
            BlockKind::Call => "Duplicate call block",
            BlockKind::Task => "Duplicate task block",
            BlockKind::Schedule => "Duplicate schedule block",
            BlockKind::Param => "Duplicate param block",
        }
    }

    /// `on` and `call` slugs are both message ids in a sequence and share
    /// one namespace
    fn namespace(self) -> BlockKind {
        match self {
            BlockKind::Call => BlockKind::On,
            other => other,
        }
    }
}

/// Accumulates blocks from every `.hops` file of an automations set
pub(crate) struct Decoder {
    hops: HopsAst,
    diagnostics: Diagnostics,
    slugs: HashSet<(BlockKind, String)>,
    literals: EvalContext<'static>,
}

impl Decoder {
    pub(crate) fn new() -> Self {
        Self {
            hops: HopsAst::default(),
            diagnostics: Diagnostics::new(),
            slugs: HashSet::new(),
            literals: EvalContext::new(),
        }
    }

    pub(crate) fn finish(self) -> (HopsAst, Diagnostics) {
        (self.hops, self.diagnostics)
    }

    fn error(&mut self, file: &str, summary: &str, detail: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(summary, detail).in_file(file));
    }

    /// Parse one `.hops` file and decode its top-level blocks
    pub(crate) fn decode_file(&mut self, file: &str, source: &[u8]) {
        let source = String::from_utf8_lossy(source);
        let body: Body = match hcl::parse(&source) {
            Ok(body) => body,
            Err(e) => {
                self.error(file, "Invalid hops file", e.to_string());
                return;
            }
        };
        trace!(file, "Decoding hops file");

        for structure in body.iter() {
            match structure {
                Structure::Attribute(attr) => self.unexpected_attribute(file, attr),
                Structure::Block(block) => match block.identifier() {
                    "on" => self.decode_on(file, block),
                    "schedule" => self.decode_schedule(file, block),
                    "task" => self.decode_task(file, block),
                    other => self.unsupported_block(file, other),
                },
            }
        }
    }

    fn unexpected_attribute(&mut self, file: &str, attr: &Attribute) {
        self.error(
            file,
            "Unsupported argument",
            format!("An argument named \"{}\" is not expected here", attr.key()),
        );
    }

    fn unsupported_block(&mut self, file: &str, identifier: &str) {
        self.error(
            file,
            "Unsupported block type",
            format!("Blocks of type \"{}\" are not expected here", identifier),
        );
    }

    fn register(&mut self, file: &str, kind: BlockKind, slug: &str) -> bool {
        if self.slugs.insert((kind.namespace(), slug.to_string())) {
            return true;
        }
        self.error(
            file,
            kind.duplicate_summary(),
            format!("\"{}\" is already declared", slug),
        );
        false
    }

    fn check_label(&mut self, file: &str, label: &str) -> bool {
        match validate_label(label) {
            Ok(()) => true,
            Err(message) => {
                self.error(file, "Invalid label", format!("\"{}\": {}", label, message));
                false
            }
        }
    }

    /// Labels of a block, requiring between `min` and `max` of them
    fn labels<'b>(
        &mut self,
        file: &str,
        block: &'b Block,
        min: usize,
        max: usize,
    ) -> Option<Vec<&'b str>> {
        let labels: Vec<&str> = block.labels().iter().map(|l| l.as_str()).collect();
        if labels.len() < min || labels.len() > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} or {}", min, max)
            };
            self.error(
                file,
                "Invalid block labels",
                format!(
                    "\"{}\" blocks take {} labels, found {}",
                    block.identifier(),
                    expected,
                    labels.len()
                ),
            );
            return None;
        }
        Some(labels)
    }

    /// Evaluate an attribute that must not depend on runtime variables
    fn literal(&mut self, file: &str, attr: &Attribute) -> Option<Value> {
        match self.literals.evaluate(attr.expr()) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                self.error(
                    file,
                    "Invalid expression",
                    format!("\"{}\": {}", attr.key(), e),
                );
                None
            }
        }
    }

    fn literal_string(&mut self, file: &str, attr: &Attribute) -> Option<String> {
        match self.literal(file, attr)? {
            Value::String(s) => Some(s),
            other => {
                self.error(
                    file,
                    "Incorrect attribute value type",
                    format!("\"{}\" must be a string, found {}", attr.key(), type_name(&other)),
                );
                None
            }
        }
    }

    fn literal_bool(&mut self, file: &str, attr: &Attribute) -> Option<bool> {
        match self.literal(file, attr)? {
            Value::Bool(b) => Some(b),
            other => {
                self.error(
                    file,
                    "Incorrect attribute value type",
                    format!("\"{}\" must be a bool, found {}", attr.key(), type_name(&other)),
                );
                None
            }
        }
    }

    fn decode_on(&mut self, file: &str, block: &Block) {
        let Some(labels) = self.labels(file, block, 1, 2) else {
            return;
        };
        let label = labels[0].to_string();
        if !self.check_label(file, &label) {
            return;
        }

        let mut name = labels.get(1).map(|s| s.to_string());
        let mut worker = None;
        let mut if_expr = None;
        let mut call_blocks = Vec::new();
        let mut dones = Vec::new();

        for structure in block.body().iter() {
            match structure {
                Structure::Attribute(attr) => match attr.key() {
                    "name" => {
                        if name.is_none() {
                            name = self.literal_string(file, attr);
                        }
                    }
                    "worker" => worker = self.literal_string(file, attr),
                    "if" => if_expr = Some(attr.expr().clone()),
                    _ => self.unexpected_attribute(file, attr),
                },
                Structure::Block(child) => match child.identifier() {
                    "call" => call_blocks.push(child),
                    "done" => {
                        if let Some(done) = self.decode_done(file, child) {
                            dones.push(done);
                        }
                    }
                    other => self.unsupported_block(file, other),
                },
            }
        }

        let slug = match &name {
            Some(name) => slugify_parts(&[&label, name]),
            None => slugify(&label),
        };
        if is_reserved_message_id(&slug) {
            self.error(
                file,
                "Reserved name",
                format!("\"{}\" is reserved and cannot be used as an on block slug", slug),
            );
            return;
        }
        if !self.register(file, BlockKind::On, &slug) {
            return;
        }

        let worker = match worker {
            Some(w) if !w.contains('.') => format!("{}.{}", automation_dir(file), w),
            Some(w) => w,
            None => DEFAULT_WORKER.to_string(),
        };

        let calls = call_blocks
            .into_iter()
            .filter_map(|call| self.decode_call(file, &slug, call))
            .collect();

        self.hops.push_on(OnAst {
            label,
            name,
            slug,
            worker,
            if_expr,
            calls,
            dones,
            file_path: file.to_string(),
        });
    }

    fn decode_call(&mut self, file: &str, on_slug: &str, block: &Block) -> Option<CallAst> {
        let labels = self.labels(file, block, 1, 2)?;
        let label = labels[0].to_string();
        if !self.check_label(file, &label) {
            return None;
        }

        let mut name = labels.get(1).map(|s| s.to_string());
        let mut if_expr = None;
        let mut inputs_expr = None;

        for structure in block.body().iter() {
            match structure {
                Structure::Attribute(attr) => match attr.key() {
                    "name" => {
                        if name.is_none() {
                            name = self.literal_string(file, attr);
                        }
                    }
                    "if" => if_expr = Some(attr.expr().clone()),
                    "inputs" => inputs_expr = Some(attr.expr().clone()),
                    _ => self.unexpected_attribute(file, attr),
                },
                Structure::Block(child) => self.unsupported_block(file, child.identifier()),
            }
        }

        let slug = match &name {
            Some(name) => format!("{}-{}", on_slug, slugify_parts(&[&label, name])),
            None => format!("{}-{}", on_slug, slugify(&label)),
        };
        if is_reserved_message_id(&slug) {
            self.error(
                file,
                "Reserved name",
                format!("\"{}\" is reserved and cannot be used as a call slug", slug),
            );
            return None;
        }
        if !self.register(file, BlockKind::Call, &slug) {
            return None;
        }

        let (app, handler) = match label.split_once('_') {
            Some((app, handler)) => (app.to_string(), handler.to_string()),
            None => (label.clone(), DEFAULT_HANDLER.to_string()),
        };

        Some(CallAst {
            label,
            name,
            slug,
            app,
            handler,
            if_expr,
            inputs_expr,
        })
    }

    fn decode_done(&mut self, file: &str, block: &Block) -> Option<DoneAst> {
        self.labels(file, block, 0, 0)?;
        let mut done = DoneAst::default();
        for structure in block.body().iter() {
            match structure {
                Structure::Attribute(attr) => match attr.key() {
                    "completed" => done.completed = Some(attr.expr().clone()),
                    "errored" => done.errored = Some(attr.expr().clone()),
                    _ => self.unexpected_attribute(file, attr),
                },
                Structure::Block(child) => self.unsupported_block(file, child.identifier()),
            }
        }
        Some(done)
    }

    fn decode_schedule(&mut self, file: &str, block: &Block) {
        let Some(labels) = self.labels(file, block, 1, 1) else {
            return;
        };
        let name = labels[0].to_string();
        if !self.check_label(file, &name) {
            return;
        }

        let mut cron = None;
        let mut cron_rejected = false;
        let mut inputs_expr: Option<Expression> = None;
        for structure in block.body().iter() {
            match structure {
                Structure::Attribute(attr) => match attr.key() {
                    "cron" => {
                        let reported = self.diagnostics.len();
                        let value = self.literal_string(file, attr);
                        // A wrong type or bad expression is already reported
                        cron_rejected = value.is_none() && self.diagnostics.len() > reported;
                        cron = Some(value.unwrap_or_default());
                    }
                    "inputs" => inputs_expr = Some(attr.expr().clone()),
                    _ => self.unexpected_attribute(file, attr),
                },
                Structure::Block(child) => self.unsupported_block(file, child.identifier()),
            }
        }

        if cron_rejected {
            return;
        }
        let Some(cron) = cron else {
            self.error(
                file,
                "Missing required argument",
                format!("schedule \"{}\" needs a \"cron\" argument", name),
            );
            return;
        };
        if let Err(e) = parse_cron(&cron) {
            self.error(file, "Invalid cron format", format!("\"{}\": {}", cron, e));
            return;
        }

        // Schedules fire without event variables, so inputs must evaluate now
        if let Some(expr) = &inputs_expr {
            match self.literals.evaluate(expr) {
                Ok(Value::Object(_)) | Ok(Value::Null) => {}
                Ok(other) => {
                    self.error(
                        file,
                        "Invalid schedule inputs",
                        format!("inputs must be an object, found {}", type_name(&other)),
                    );
                    return;
                }
                Err(e) => {
                    self.error(file, "Invalid schedule inputs", e.to_string());
                    return;
                }
            }
        }

        let slug = slugify(&name);
        if !self.register(file, BlockKind::Schedule, &slug) {
            return;
        }

        self.hops.schedules.push(ScheduleAst {
            name,
            cron,
            inputs_expr,
            file_path: file.to_string(),
        });
    }

    fn decode_task(&mut self, file: &str, block: &Block) {
        let Some(labels) = self.labels(file, block, 1, 1) else {
            return;
        };
        let name = labels[0].to_string();
        if !self.check_label(file, &name) {
            return;
        }

        let mut task = TaskAst {
            display_name: title_case(&name),
            name,
            description: String::new(),
            emoji: String::new(),
            summary: String::new(),
            params: Vec::new(),
            filepath: file.to_string(),
        };

        for structure in block.body().iter() {
            match structure {
                Structure::Attribute(attr) => {
                    let target = match attr.key() {
                        "description" => &mut task.description,
                        "display_name" => &mut task.display_name,
                        "emoji" => &mut task.emoji,
                        "summary" => &mut task.summary,
                        _ => {
                            self.unexpected_attribute(file, attr);
                            continue;
                        }
                    };
                    if let Some(value) = self.literal_string(file, attr) {
                        *target = value;
                    }
                }
                Structure::Block(child) if child.identifier() == "param" => {
                    if let Some(param) = self.decode_param(file, &task.name, child) {
                        task.params.push(param);
                    }
                }
                Structure::Block(child) => self.unsupported_block(file, child.identifier()),
            }
        }

        let slug = slugify(&task.name);
        if self.register(file, BlockKind::Task, &slug) {
            self.hops.tasks.push(task);
        }
    }

    fn decode_param(&mut self, file: &str, task_name: &str, block: &Block) -> Option<ParamAst> {
        let labels = self.labels(file, block, 1, 1)?;
        let name = labels[0].to_string();
        if !self.check_label(file, &name) {
            return None;
        }

        let mut param = ParamAst {
            param_type: ParamType::String,
            default: None,
            display_name: title_case(&name),
            flag: format!("--{}", name),
            shortflag: String::new(),
            help: String::new(),
            required: false,
            name,
        };
        let mut default_attr = None;

        for structure in block.body().iter() {
            match structure {
                Structure::Attribute(attr) => match attr.key() {
                    "type" => {
                        if let Some(value) = self.literal_string(file, attr) {
                            match ParamType::parse(&value) {
                                Some(param_type) => param.param_type = param_type,
                                None => {
                                    self.error(
                                        file,
                                        "Invalid param type",
                                        format!(
                                            "\"{}\" must be one of string, text, number or bool",
                                            value
                                        ),
                                    );
                                    return None;
                                }
                            }
                        }
                    }
                    "default" => default_attr = Some(attr),
                    "display_name" => {
                        if let Some(value) = self.literal_string(file, attr) {
                            param.display_name = value;
                        }
                    }
                    "flag" => {
                        if let Some(value) = self.literal_string(file, attr) {
                            param.flag = value;
                        }
                    }
                    "shortflag" => {
                        if let Some(value) = self.literal_string(file, attr) {
                            param.shortflag = value;
                        }
                    }
                    "help" => {
                        if let Some(value) = self.literal_string(file, attr) {
                            param.help = value;
                        }
                    }
                    "required" => {
                        if let Some(value) = self.literal_bool(file, attr) {
                            param.required = value;
                        }
                    }
                    _ => self.unexpected_attribute(file, attr),
                },
                Structure::Block(child) => self.unsupported_block(file, child.identifier()),
            }
        }

        // The default is checked once the declared type is known
        if let Some(attr) = default_attr {
            if let Some(value) = self.literal(file, attr) {
                if !param.param_type.accepts(&value) {
                    self.error(
                        file,
                        "Invalid default for param",
                        format!(
                            "default of \"{}\" must be a {}, found {}",
                            param.name,
                            param.param_type,
                            type_name(&value)
                        ),
                    );
                    return None;
                }
                param.default = Some(value);
            }
        }

        let slug = format!("{}-{}", slugify(task_name), slugify(&param.name));
        if !self.register(file, BlockKind::Param, &slug) {
            return None;
        }
        Some(param)
    }
}
