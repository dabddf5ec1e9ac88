//! Automation files for hops
//!
//! An automations directory holds one subdirectory per automation. Each
//! contains `.hops` files declaring `on`, `schedule` and `task` blocks, an
//! optional `manifest.yaml`, and any assets read by `file()` or `template()`.
//!
//! # Architecture
//!
//! ```text
//! directory ──► files ──► decode ──► Automations { files, manifests, hops, hash }
//!                            │
//!                       Diagnostics
//!
//! MessageBundle ──► EvaluationCtx ──► matching ons, done outcome, call inputs
//! ```
//!
//! # Key Types
//!
//! - [`Automations`] - an immutable, decoded automations set identified by its hash
//! - [`OnAst`], [`CallAst`], [`DoneAst`], [`ScheduleAst`], [`TaskAst`] - decoded blocks
//! - [`EvaluationCtx`] - variables for one sequence, scoped per block
//! - [`Diagnostic`] - a problem found in a file

mod ast;
mod automations;
mod decode;
mod diagnostics;
mod error;
mod evaluate;
mod files;
mod manifest;
mod schedule;
mod task;
mod validate;

pub use ast::{
    CallAst, DoneAst, DoneOutcome, HopsAst, OnAst, ParamAst, ParamType, ScheduleAst, TaskAst,
};
pub use automations::{decode_files, Automations, EMPTY_HASH};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{DslError, DslResult};
pub use evaluate::{eval_bool, eval_done, eval_inputs, EvaluationCtx};
pub use files::{automation_dir, file_type, read_automation_dir, AutomationFile, FileType};
pub use manifest::{Manifest, ManifestStep};
pub use schedule::parse_cron;
pub use task::{validate_task_input, InputErrors};
pub use validate::{validate_dir, validate_label, ValidationReport, MAX_LABEL_LEN};
pub use hops_expression::Files;
