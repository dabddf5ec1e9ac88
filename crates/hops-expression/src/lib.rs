//! Expression evaluation for hops automations
//!
//! Attribute values in `.hops` files are HCL expressions. This crate
//! evaluates them over JSON values with a fixed library of pure functions.
//!
//! # Architecture
//!
//! ```text
//! hcl::Expression ──► eval ──► serde_json::Value
//!                      │
//!                EvalContext (variables + functions, parent chain)
//!                      │
//!          stateless library ─┬─ file()/template() bound per block
//! ```
//!
//! # Key Types
//!
//! - [`EvalContext`] - a scope of variables and functions with an optional parent
//! - [`Function`] - a library function with its arity
//! - [`EvalError`] - why an expression could not be evaluated

mod context;
mod error;
mod eval;
mod funcs;
mod value;

pub use context::{EvalContext, FuncResult, Function, FunctionTable};
pub use error::{EvalError, EvalResult};
pub use eval::evaluate;
pub use funcs::{
    glob_match, read_file, render_template, stateful_functions, stateless_functions,
    template_version, xglob_match, Files,
};
pub use value::{as_bool, as_number, as_string, expect_bool, expect_number, expect_string, type_name};
