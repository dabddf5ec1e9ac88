//! Evaluating blocks against a sequence's message bundle
//!
//! The root scope holds one variable per bundle entry. Each `on` block gets a
//! child scope where entries prefixed with its slug are hoisted
//! (`deploy-build` is visible as `build` inside `on deploy`), together with
//! `file()` and `template()` bound to the declaring directory.

use hcl::Expression;
use hops_core::{event_name, CoreResult, EventName, MessageBundle, HOPS_META_KEY, SOURCE_EVENT_ID};
use hops_expression::{stateful_functions, type_name, EvalContext, EvalError, EvalResult, Files};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{DoneAst, DoneOutcome, OnAst};
use crate::automations::Automations;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// Variables for one sequence plus the files blocks may read
pub struct EvaluationCtx {
    root: EvalContext<'static>,
    files: Arc<Files>,
}

impl EvaluationCtx {
    /// Root scope built from a bundle; payloads that are not JSON become strings
    pub fn from_bundle(bundle: &MessageBundle, files: Arc<Files>) -> Self {
        let variables: HashMap<String, Value> = bundle
            .iter()
            .map(|(id, raw)| {
                let value = serde_json::from_slice(raw)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()));
                (id.clone(), value)
            })
            .collect();

        Self {
            root: EvalContext::with_variables(variables),
            files,
        }
    }

    pub fn root(&self) -> &EvalContext<'static> {
        &self.root
    }

    /// Event and action of the bundle's source event
    pub fn event_name(&self) -> CoreResult<EventName> {
        let event = self
            .root
            .lookup_var(SOURCE_EVENT_ID)
            .cloned()
            .unwrap_or(Value::Null);
        event_name(&event, HOPS_META_KEY)
    }

    /// Scope for a block declared in `dir` whose slug is `slug`
    pub fn block_scoped(&self, dir: &str, slug: &str) -> EvalContext<'_> {
        let mut scope = self.root.child();
        let prefix = format!("{}-", slug);
        for (key, value) in self.root.variables() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    scope.declare_var(rest, value.clone());
                }
            }
        }
        scope.declare_funcs(stateful_functions(self.files.clone(), dir));
        scope
    }

    /// Scope for an `on` block
    pub fn on_scoped(&self, on: &OnAst) -> EvalContext<'_> {
        self.block_scoped(on.dir(), &on.slug)
    }

    /// `on` blocks of `automations` whose `if` holds for this bundle
    ///
    /// An `if` that fails to evaluate skips its block and is reported.
    pub fn matching_ons<'a>(
        &self,
        automations: &'a Automations,
        name: &EventName,
    ) -> (Vec<&'a OnAst>, Diagnostics) {
        let mut matched = Vec::new();
        let mut diagnostics = Diagnostics::new();
        for on in automations.event_ons(name) {
            let scope = self.on_scoped(on);
            match eval_bool(on.if_expr.as_ref(), true, &scope) {
                Ok(true) => matched.push(on),
                Ok(false) => {}
                Err(e) => diagnostics.push(
                    Diagnostic::error("Invalid on condition", format!("{}: {}", on.slug, e))
                        .in_file(&on.file_path),
                ),
            }
        }
        (matched, diagnostics)
    }
}

/// Evaluate an optional boolean attribute; unset and null yield `unset`
pub fn eval_bool(expr: Option<&Expression>, unset: bool, scope: &EvalContext<'_>) -> EvalResult<bool> {
    let Some(expr) = expr else {
        return Ok(unset);
    };
    match scope.evaluate(expr)? {
        Value::Null => Ok(unset),
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch {
            expected: "true, false or unset".to_string(),
            found: type_name(&other).to_string(),
        }),
    }
}

/// Evaluate `inputs` to compact JSON; unset and null yield no bytes
pub fn eval_inputs(expr: Option<&Expression>, scope: &EvalContext<'_>) -> EvalResult<Vec<u8>> {
    let Some(expr) = expr else {
        return Ok(Vec::new());
    };
    match scope.evaluate(expr)? {
        Value::Null => Ok(Vec::new()),
        value => serde_json::to_vec(&value).map_err(|e| EvalError::Unsupported {
            message: e.to_string(),
        }),
    }
}

/// First `done` block whose `errored` or `completed` holds
///
/// A block that fails to evaluate is skipped and the next one is tried.
pub fn eval_done(dones: &[DoneAst], scope: &EvalContext<'_>) -> (DoneOutcome, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    for done in dones {
        match eval_bool(done.errored.as_ref(), false, scope) {
            Ok(true) => return (DoneOutcome::Errored, diagnostics),
            Ok(false) => {}
            Err(e) => diagnostics.push(Diagnostic::error("Invalid done condition", e.to_string())),
        }
        match eval_bool(done.completed.as_ref(), false, scope) {
            Ok(true) => return (DoneOutcome::Completed, diagnostics),
            Ok(false) => {}
            Err(e) => diagnostics.push(Diagnostic::error("Invalid done condition", e.to_string())),
        }
    }
    (DoneOutcome::None, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::AutomationFile;
    use serde_json::json;

    fn bundle(entries: &[(&str, Value)]) -> MessageBundle {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::to_vec(v).unwrap()))
            .collect()
    }

    fn expr(source: &str) -> Expression {
        let body: hcl::Body = hcl::parse(&format!("x = {}", source)).unwrap();
        body.attributes().next().unwrap().expr().clone()
    }

    fn automations(source: &str) -> Automations {
        let (automations, diags) =
            Automations::from_files(vec![AutomationFile::new("a/main.hops", source.as_bytes())]);
        assert!(diags.is_empty(), "{diags}");
        automations
    }

    #[test]
    fn test_event_name_from_bundle() {
        let ctx = EvaluationCtx::from_bundle(
            &bundle(&[("event", json!({"hops": {"event": "push", "action": "created"}}))]),
            Arc::new(Files::new()),
        );
        let name = ctx.event_name().unwrap();
        assert_eq!(name.event, "push");
        assert_eq!(name.action.as_deref(), Some("created"));

        let missing = EvaluationCtx::from_bundle(&MessageBundle::new(), Arc::new(Files::new()));
        assert!(missing.event_name().is_err());
    }

    #[test]
    fn test_non_json_payloads_are_strings() {
        let mut raw = MessageBundle::new();
        raw.insert("note".into(), b"plain text".to_vec());
        let ctx = EvaluationCtx::from_bundle(&raw, Arc::new(Files::new()));
        assert_eq!(ctx.root().lookup_var("note"), Some(&json!("plain text")));
    }

    #[test]
    fn test_hoisting() {
        let ctx = EvaluationCtx::from_bundle(
            &bundle(&[
                ("event", json!({})),
                ("deploy-build", json!({"completed": true})),
                ("other-build", json!({"completed": false})),
            ]),
            Arc::new(Files::new()),
        );
        let scope = ctx.block_scoped("a", "deploy");
        assert_eq!(eval_bool(Some(&expr("build.completed")), false, &scope), Ok(true));
        assert!(scope.lookup_var("deploy-build").is_some());

        let other = ctx.block_scoped("a", "other");
        assert_eq!(eval_bool(Some(&expr("build.completed")), true, &other), Ok(false));
    }

    #[test]
    fn test_eval_bool_rules() {
        let scope = EvalContext::new();
        assert_eq!(eval_bool(None, true, &scope), Ok(true));
        assert_eq!(eval_bool(None, false, &scope), Ok(false));
        assert_eq!(eval_bool(Some(&expr("null")), true, &scope), Ok(true));
        assert_eq!(eval_bool(Some(&expr("1 == 2")), true, &scope), Ok(false));
        assert!(matches!(
            eval_bool(Some(&expr("\"yes\"")), true, &scope),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert!(eval_bool(Some(&expr("missing.value")), true, &scope).is_err());
    }

    #[test]
    fn test_eval_inputs() {
        let scope = EvalContext::new();
        assert_eq!(eval_inputs(None, &scope).unwrap(), b"");
        assert_eq!(eval_inputs(Some(&expr("null")), &scope).unwrap(), b"");
        assert_eq!(
            eval_inputs(Some(&expr("{ a = \"b\" }")), &scope).unwrap(),
            br#"{"a":"b"}"#
        );
    }

    #[test]
    fn test_eval_done_first_match() {
        let scope = EvalContext::new();
        let done = |errored: Option<&str>, completed: Option<&str>| DoneAst {
            errored: errored.map(expr),
            completed: completed.map(expr),
        };

        let (outcome, _) = eval_done(&[done(None, Some("false")), done(Some("true"), None)], &scope);
        assert_eq!(outcome, DoneOutcome::Errored);

        let (outcome, diags) = eval_done(&[done(Some("nope.x"), None), done(None, Some("true"))], &scope);
        assert_eq!(outcome, DoneOutcome::Completed);
        assert_eq!(diags.len(), 1);

        let (outcome, _) = eval_done(&[], &scope);
        assert!(!outcome.is_done());
    }

    #[test]
    fn test_matching_ons() {
        let automations = automations(
            r#"
            on push {}
            on push skipped {
              if = event.branch == "dev"
            }
            on push broken {
              if = event.nope.deeper
            }
            on push_created {}
            "#,
        );
        let ctx = EvaluationCtx::from_bundle(
            &bundle(&[(
                "event",
                json!({"hops": {"event": "push", "action": "created"}, "branch": "main"}),
            )]),
            automations.files.clone(),
        );
        let name = ctx.event_name().unwrap();
        let (ons, diags) = ctx.matching_ons(&automations, &name);
        let slugs: Vec<_> = ons.iter().map(|o| o.slug.as_str()).collect();
        assert_eq!(slugs, vec!["push_created", "push"]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.iter().next().unwrap().file.as_deref(), Some("a/main.hops"));
    }
}
