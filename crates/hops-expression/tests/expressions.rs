//! Expressions as they appear in automation files
//!
//! Each test parses a small HCL body and evaluates its attributes the way
//! the runner does: event variables at the root, per-block functions in a
//! child scope.

use hops_expression::{stateful_functions, EvalContext, EvalError, Files};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn root_with_event(event: Value) -> EvalContext<'static> {
    let mut vars = HashMap::new();
    vars.insert("event".to_string(), event);
    EvalContext::with_variables(vars)
}

fn attr(ctx: &EvalContext<'_>, source: &str) -> Result<Value, EvalError> {
    let body: hcl::Body = hcl::parse(source).unwrap();
    let attr = body.attributes().next().unwrap();
    ctx.evaluate(attr.expr())
}

#[test]
fn test_if_condition_over_event() {
    let ctx = root_with_event(json!({
        "hops": {"source": "github", "event": "pull_request", "action": "opened"},
        "branch": "main",
        "changed": ["src/lib.rs", "docs/readme.md"]
    }));

    assert_eq!(
        attr(&ctx, "if = event.branch == \"main\" && glob(event.changed, \"src/**\")").unwrap(),
        json!(true)
    );
    assert_eq!(
        attr(&ctx, "if = xglob(event.changed, \"src/**\")").unwrap(),
        json!(false)
    );
}

#[test]
fn test_inputs_object() {
    let ctx = root_with_event(json!({"user": {"name": "ada"}, "count": 2}));
    let out = attr(
        &ctx,
        r#"inputs = {
            greeting = "hello ${upper(event.user.name)}"
            next     = event.count + 1
            tags     = [for t in ["a", "b"] : "${t}-${event.count}"]
        }"#,
    )
    .unwrap();

    assert_eq!(
        out,
        json!({"greeting": "hello ADA", "next": 3, "tags": ["a-2", "b-2"]})
    );
}

#[test]
fn test_missing_result_fails_without_try() {
    let ctx = root_with_event(json!({}));
    assert!(matches!(
        attr(&ctx, "if = first_call.completed"),
        Err(EvalError::UnknownVariable { .. })
    ));
    assert_eq!(
        attr(&ctx, "if = try(first_call.completed, false)").unwrap(),
        json!(false)
    );
    assert_eq!(attr(&ctx, "if = can(first_call)").unwrap(), json!(false));
}

#[test]
fn test_block_scope_functions() {
    let root = root_with_event(json!({"name": "release"}));

    let mut files = Files::new();
    files.insert("deploy/message.txt".into(), b"Deploying {{ name }}".to_vec());
    let files = Arc::new(files);

    let mut block = root.child();
    block.declare_funcs(stateful_functions(files, "deploy"));

    assert_eq!(
        attr(&block, "body = template(\"message.txt\", { name = event.name })").unwrap(),
        json!("Deploying release")
    );
    assert!(matches!(
        attr(&root, "body = file(\"message.txt\")"),
        Err(EvalError::UnknownFunction { .. })
    ));
}

#[test]
fn test_hoisted_variables_shadow_root() {
    let mut root = root_with_event(json!({}));
    root.declare_var("deploy-build", json!({"completed": true}));

    let mut block = root.child();
    block.declare_var("build", json!({"completed": true}));

    assert_eq!(attr(&block, "if = build.completed").unwrap(), json!(true));
    assert_eq!(
        attr(&block, "if = event == {}").unwrap(),
        json!(true)
    );
    assert!(attr(&root, "if = build.completed").is_err());
}

#[test]
fn test_function_errors_name_the_function() {
    let ctx = EvalContext::new();
    let err = attr(&ctx, "x = jsondecode(\"{\")").unwrap_err();
    assert!(err.to_string().starts_with("jsondecode:"));

    let err = attr(&ctx, "x = upper()").unwrap_err();
    assert!(matches!(err, EvalError::WrongArity { .. }));
}
