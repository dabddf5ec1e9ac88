//! Evaluation scopes
//!
//! An [`EvalContext`] holds variables and functions and an optional parent.
//! Lookups walk the chain from the innermost scope outwards, so a child only
//! shadows the names it declares itself.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EvalError, EvalResult};
use crate::eval;
use crate::funcs;

/// Outcome of a library function: a value or a message describing bad input
pub type FuncResult = Result<Value, String>;

type FuncImpl = dyn Fn(&[Value]) -> FuncResult + Send + Sync;

/// A library function with its arity
#[derive(Clone)]
pub struct Function {
    min_args: usize,
    max_args: Option<usize>,
    imp: Arc<FuncImpl>,
}

impl Function {
    /// Function taking exactly `params` arguments
    pub fn new(params: usize, f: impl Fn(&[Value]) -> FuncResult + Send + Sync + 'static) -> Self {
        Self {
            min_args: params,
            max_args: Some(params),
            imp: Arc::new(f),
        }
    }

    /// Function taking between `min` and `max` arguments
    pub fn ranged(
        min: usize,
        max: usize,
        f: impl Fn(&[Value]) -> FuncResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            min_args: min,
            max_args: Some(max),
            imp: Arc::new(f),
        }
    }

    /// Function taking at least `min` arguments
    pub fn variadic(min: usize, f: impl Fn(&[Value]) -> FuncResult + Send + Sync + 'static) -> Self {
        Self {
            min_args: min,
            max_args: None,
            imp: Arc::new(f),
        }
    }

    /// Check arity and invoke
    pub fn call(&self, name: &str, args: &[Value]) -> EvalResult<Value> {
        let too_few = args.len() < self.min_args;
        let too_many = self.max_args.is_some_and(|max| args.len() > max);
        if too_few || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => max.to_string(),
                Some(max) => format!("{}-{}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(EvalError::WrongArity {
                function: name.to_string(),
                expected,
                found: args.len(),
            });
        }

        (self.imp)(args).map_err(|message| EvalError::InvalidArgument {
            function: name.to_string(),
            message,
        })
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish_non_exhaustive()
    }
}

/// Functions keyed by name
pub type FunctionTable = HashMap<String, Function>;

/// A variable and function scope with an optional parent
#[derive(Debug, Clone)]
pub struct EvalContext<'p> {
    parent: Option<&'p EvalContext<'p>>,
    variables: HashMap<String, Value>,
    functions: Arc<FunctionTable>,
}

impl EvalContext<'static> {
    /// Root scope with the stateless function library and no variables
    pub fn new() -> Self {
        Self::with_variables(HashMap::new())
    }

    /// Root scope with the stateless function library
    pub fn with_variables(variables: HashMap<String, Value>) -> Self {
        Self {
            parent: None,
            variables,
            functions: funcs::stateless_functions(),
        }
    }
}

impl Default for EvalContext<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p> EvalContext<'p> {
    /// Empty child scope that falls back to `self`
    pub fn child(&self) -> EvalContext<'_> {
        EvalContext {
            parent: Some(self),
            variables: HashMap::new(),
            functions: Arc::new(FunctionTable::new()),
        }
    }

    /// Declare (or shadow) a variable in this scope
    pub fn declare_var(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Declare (or shadow) a function in this scope
    pub fn declare_func(&mut self, name: impl Into<String>, func: Function) {
        Arc::make_mut(&mut self.functions).insert(name.into(), func);
    }

    /// Declare every function of `table` in this scope
    pub fn declare_funcs(&mut self, table: FunctionTable) {
        Arc::make_mut(&mut self.functions).extend(table);
    }

    /// Resolve a variable through the scope chain
    pub fn lookup_var(&self, name: &str) -> Option<&Value> {
        match self.variables.get(name) {
            Some(value) => Some(value),
            None => self.parent.and_then(|p| p.lookup_var(name)),
        }
    }

    /// Resolve a function through the scope chain
    pub fn lookup_func(&self, name: &str) -> Option<&Function> {
        match self.functions.get(name) {
            Some(func) => Some(func),
            None => self.parent.and_then(|p| p.lookup_func(name)),
        }
    }

    /// Variables declared directly in this scope
    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Evaluate an expression in this scope
    pub fn evaluate(&self, expr: &hcl::Expression) -> EvalResult<Value> {
        eval::evaluate(expr, self)
    }
}
