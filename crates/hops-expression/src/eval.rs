//! Expression evaluation over the HCL syntax tree

use hcl::expr::{
    BinaryOp, BinaryOperator, Conditional, Expression, ForExpr, FuncCall, ObjectKey, Operation,
    TemplateExpr, Traversal, TraversalOperator, UnaryOp, UnaryOperator,
};
use hcl::template::{Directive, Element, ForDirective, IfDirective, Template};
use serde_json::{Map, Value};

use crate::context::EvalContext;
use crate::error::{EvalError, EvalResult};
use crate::value::{as_string, expect_bool, expect_number, expect_string, number, type_name};

/// Evaluate `expr` against `ctx`
pub fn evaluate(expr: &Expression, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    match expr {
        Expression::Null => Ok(Value::Null),
        Expression::Bool(b) => Ok(Value::Bool(*b)),
        Expression::Number(n) => match n.as_f64() {
            Some(f) => number(f),
            None => Err(EvalError::Unsupported {
                message: format!("number literal {}", n),
            }),
        },
        Expression::String(s) => Ok(Value::String(s.clone())),
        Expression::Array(items) => items
            .iter()
            .map(|item| evaluate(item, ctx))
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::Array),
        Expression::Object(object) => {
            let mut out = Map::new();
            for (key, value) in object.iter() {
                let key = eval_object_key(key, ctx)?;
                out.insert(key, evaluate(value, ctx)?);
            }
            Ok(Value::Object(out))
        }
        Expression::TemplateExpr(template) => eval_template_expr(template, ctx),
        Expression::Variable(var) => {
            ctx.lookup_var(var.as_str())
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable {
                    name: var.as_str().to_string(),
                })
        }
        Expression::Traversal(traversal) => eval_traversal(traversal, ctx),
        Expression::FuncCall(call) => eval_func_call(call, ctx),
        Expression::Parenthesis(inner) => evaluate(inner, ctx),
        Expression::Conditional(cond) => eval_conditional(cond, ctx),
        Expression::Operation(op) => eval_operation(op, ctx),
        Expression::ForExpr(for_expr) => eval_for_expr(for_expr, ctx),
        #[allow(unreachable_patterns)]
        other => Err(EvalError::Unsupported {
            message: format!("{:?}", other),
        }),
    }
}

fn eval_object_key(key: &ObjectKey, ctx: &EvalContext<'_>) -> EvalResult<String> {
    match key {
        ObjectKey::Identifier(ident) => Ok(ident.as_str().to_string()),
        ObjectKey::Expression(expr) => {
            let value = evaluate(expr, ctx)?;
            as_string(&value).ok_or_else(|| EvalError::type_mismatch("string object key", &value))
        }
        #[allow(unreachable_patterns)]
        other => Err(EvalError::Unsupported {
            message: format!("object key {:?}", other),
        }),
    }
}

fn eval_template_expr(template: &TemplateExpr, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let template = Template::from_expr(template).map_err(|e| EvalError::Template {
        message: e.to_string(),
    })?;

    // A template that is a single interpolation yields the raw value
    if let [Element::Interpolation(interp)] = template.elements() {
        return evaluate(&interp.expr, ctx);
    }

    let mut out = String::new();
    render_template(&template, ctx, &mut out)?;
    Ok(Value::String(out))
}

fn render_template(template: &Template, ctx: &EvalContext<'_>, out: &mut String) -> EvalResult<()> {
    for element in template.elements() {
        match element {
            Element::Literal(literal) => out.push_str(literal),
            Element::Interpolation(interp) => {
                let value = evaluate(&interp.expr, ctx)?;
                out.push_str(&interpolate(&value)?);
            }
            Element::Directive(directive) => render_directive(directive, ctx, out)?,
            #[allow(unreachable_patterns)]
            _ => {
                return Err(EvalError::Template {
                    message: "unsupported template element".to_string(),
                })
            }
        }
    }
    Ok(())
}

fn render_directive(directive: &Directive, ctx: &EvalContext<'_>, out: &mut String) -> EvalResult<()> {
    match directive {
        Directive::If(if_directive) => render_if(if_directive, ctx, out),
        Directive::For(for_directive) => render_for(for_directive, ctx, out),
        #[allow(unreachable_patterns)]
        _ => Err(EvalError::Template {
            message: "unsupported template directive".to_string(),
        }),
    }
}

fn render_if(directive: &IfDirective, ctx: &EvalContext<'_>, out: &mut String) -> EvalResult<()> {
    let cond = expect_bool(&evaluate(&directive.cond_expr, ctx)?)?;
    if cond {
        render_template(&directive.true_template, ctx, out)
    } else if let Some(false_template) = &directive.false_template {
        render_template(false_template, ctx, out)
    } else {
        Ok(())
    }
}

fn render_for(directive: &ForDirective, ctx: &EvalContext<'_>, out: &mut String) -> EvalResult<()> {
    let collection = evaluate(&directive.collection_expr, ctx)?;
    for (key, value) in iterate(&collection)? {
        let mut scope = ctx.child();
        if let Some(key_var) = &directive.key_var {
            scope.declare_var(key_var.as_str(), key);
        }
        scope.declare_var(directive.value_var.as_str(), value);
        render_template(&directive.template, &scope, out)?;
    }
    Ok(())
}

fn interpolate(value: &Value) -> EvalResult<String> {
    match value {
        Value::Null => Err(EvalError::Template {
            message: "cannot include a null value in a string template".to_string(),
        }),
        other => as_string(other).ok_or_else(|| EvalError::type_mismatch("string", other)),
    }
}

fn eval_traversal(traversal: &Traversal, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let mut current = evaluate(&traversal.expr, ctx)?;
    let mut operators = traversal.operators.iter();

    while let Some(operator) = operators.next() {
        match operator {
            TraversalOperator::GetAttr(name) => {
                current = get_attr(&current, name.as_str())?;
            }
            TraversalOperator::Index(index_expr) => {
                let index = evaluate(index_expr, ctx)?;
                current = get_index(&current, &index)?;
            }
            TraversalOperator::LegacyIndex(index) => {
                current = get_index(&current, &Value::from(*index))?;
            }
            TraversalOperator::AttrSplat | TraversalOperator::FullSplat => {
                // The remaining operators apply to each element of the splat
                let rest: Vec<&TraversalOperator> = operators.by_ref().collect();
                let items = match current {
                    Value::Null => Vec::new(),
                    Value::Array(items) => items,
                    other => vec![other],
                };
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    results.push(apply_operators(item, &rest, ctx)?);
                }
                return Ok(Value::Array(results));
            }
            #[allow(unreachable_patterns)]
            other => {
                return Err(EvalError::Unsupported {
                    message: format!("traversal operator {:?}", other),
                })
            }
        }
    }

    Ok(current)
}

fn apply_operators(
    mut value: Value,
    operators: &[&TraversalOperator],
    ctx: &EvalContext<'_>,
) -> EvalResult<Value> {
    for operator in operators {
        value = match operator {
            TraversalOperator::GetAttr(name) => get_attr(&value, name.as_str())?,
            TraversalOperator::Index(index_expr) => get_index(&value, &evaluate(index_expr, ctx)?)?,
            TraversalOperator::LegacyIndex(index) => get_index(&value, &Value::from(*index))?,
            _ => {
                return Err(EvalError::Unsupported {
                    message: "nested splat operators".to_string(),
                })
            }
        };
    }
    Ok(value)
}

fn get_attr(value: &Value, name: &str) -> EvalResult<Value> {
    match value {
        Value::Object(map) => map
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnsupportedAttribute {
                name: name.to_string(),
            }),
        Value::Null => Err(EvalError::InvalidIndex {
            message: format!("attempt to get attribute \"{}\" from a null value", name),
        }),
        other => Err(EvalError::InvalidIndex {
            message: format!("cannot get attribute \"{}\" of a {}", name, type_name(other)),
        }),
    }
}

pub(crate) fn get_index(value: &Value, index: &Value) -> EvalResult<Value> {
    match value {
        Value::Array(items) => {
            let idx = expect_number(index)?;
            if idx < 0.0 || idx.fract() != 0.0 || idx as usize >= items.len() {
                return Err(EvalError::InvalidIndex {
                    message: format!("index {} out of range for tuple of length {}", idx, items.len()),
                });
            }
            Ok(items[idx as usize].clone())
        }
        Value::Object(map) => {
            let key = expect_string(index)?;
            map.get(&key)
                .cloned()
                .ok_or_else(|| EvalError::InvalidIndex {
                    message: format!("the given key \"{}\" does not identify an element", key),
                })
        }
        other => Err(EvalError::InvalidIndex {
            message: format!("cannot index a {}", type_name(other)),
        }),
    }
}

fn eval_func_call(call: &FuncCall, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let name = call.name.as_str();

    // `can` and `try` need the unevaluated arguments
    match name {
        "can" => {
            if call.args.len() != 1 {
                return Err(EvalError::WrongArity {
                    function: "can".to_string(),
                    expected: "1".to_string(),
                    found: call.args.len(),
                });
            }
            return Ok(Value::Bool(evaluate(&call.args[0], ctx).is_ok()));
        }
        "try" => {
            let mut last_err = None;
            for arg in &call.args {
                match evaluate(arg, ctx) {
                    Ok(value) => return Ok(value),
                    Err(err) => last_err = Some(err),
                }
            }
            return Err(EvalError::InvalidArgument {
                function: "try".to_string(),
                message: match last_err {
                    Some(err) => format!("no expression succeeded: {}", err),
                    None => "at least one argument is required".to_string(),
                },
            });
        }
        _ => {}
    }

    let func = ctx
        .lookup_func(name)
        .ok_or_else(|| EvalError::UnknownFunction {
            name: name.to_string(),
        })?;

    let mut args = call
        .args
        .iter()
        .map(|arg| evaluate(arg, ctx))
        .collect::<EvalResult<Vec<_>>>()?;

    if call.expand_final {
        match args.pop() {
            Some(Value::Array(items)) => args.extend(items),
            Some(other) => return Err(EvalError::type_mismatch("tuple to expand", &other)),
            None => {}
        }
    }

    func.call(name, &args)
}

fn eval_conditional(cond: &Conditional, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    if expect_bool(&evaluate(&cond.cond_expr, ctx)?)? {
        evaluate(&cond.true_expr, ctx)
    } else {
        evaluate(&cond.false_expr, ctx)
    }
}

fn eval_operation(op: &Operation, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    match op {
        Operation::Unary(unary) => eval_unary(unary, ctx),
        Operation::Binary(binary) => eval_binary(binary, ctx),
        #[allow(unreachable_patterns)]
        other => Err(EvalError::Unsupported {
            message: format!("operation {:?}", other),
        }),
    }
}

fn eval_unary(op: &UnaryOp, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let value = evaluate(&op.expr, ctx)?;
    match op.operator {
        UnaryOperator::Neg => number(-expect_number(&value)?),
        UnaryOperator::Not => Ok(Value::Bool(!expect_bool(&value)?)),
        #[allow(unreachable_patterns)]
        other => Err(EvalError::Unsupported {
            message: format!("operator {:?}", other),
        }),
    }
}

fn eval_binary(op: &BinaryOp, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    // Logical operators short-circuit
    match op.operator {
        BinaryOperator::And => {
            let lhs = expect_bool(&evaluate(&op.lhs_expr, ctx)?)?;
            if !lhs {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(expect_bool(&evaluate(&op.rhs_expr, ctx)?)?));
        }
        BinaryOperator::Or => {
            let lhs = expect_bool(&evaluate(&op.lhs_expr, ctx)?)?;
            if lhs {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(expect_bool(&evaluate(&op.rhs_expr, ctx)?)?));
        }
        _ => {}
    }

    let lhs = evaluate(&op.lhs_expr, ctx)?;
    let rhs = evaluate(&op.rhs_expr, ctx)?;

    match op.operator {
        BinaryOperator::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOperator::NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOperator::Less => compare(&lhs, &rhs, |a, b| a < b),
        BinaryOperator::LessEq => compare(&lhs, &rhs, |a, b| a <= b),
        BinaryOperator::Greater => compare(&lhs, &rhs, |a, b| a > b),
        BinaryOperator::GreaterEq => compare(&lhs, &rhs, |a, b| a >= b),
        BinaryOperator::Plus => number(expect_number(&lhs)? + expect_number(&rhs)?),
        BinaryOperator::Minus => number(expect_number(&lhs)? - expect_number(&rhs)?),
        BinaryOperator::Mul => number(expect_number(&lhs)? * expect_number(&rhs)?),
        BinaryOperator::Div => {
            let divisor = expect_number(&rhs)?;
            if divisor == 0.0 {
                return Err(EvalError::InvalidArgument {
                    function: "/".to_string(),
                    message: "divide by zero".to_string(),
                });
            }
            number(expect_number(&lhs)? / divisor)
        }
        BinaryOperator::Mod => {
            let divisor = expect_number(&rhs)?;
            if divisor == 0.0 {
                return Err(EvalError::InvalidArgument {
                    function: "%".to_string(),
                    message: "modulo by zero".to_string(),
                });
            }
            number(expect_number(&lhs)? % divisor)
        }
        #[allow(unreachable_patterns)]
        other => Err(EvalError::Unsupported {
            message: format!("operator {:?}", other),
        }),
    }
}

fn compare(lhs: &Value, rhs: &Value, f: impl Fn(f64, f64) -> bool) -> EvalResult<Value> {
    Ok(Value::Bool(f(expect_number(lhs)?, expect_number(rhs)?)))
}

/// Equality that treats `1` and `1.0` as the same number
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => lhs == rhs,
    }
}

fn eval_for_expr(for_expr: &ForExpr, ctx: &EvalContext<'_>) -> EvalResult<Value> {
    let collection = evaluate(&for_expr.collection_expr, ctx)?;
    let mut tuple = Vec::new();
    let mut object = Map::new();

    for (key, value) in iterate(&collection)? {
        let mut scope = ctx.child();
        if let Some(key_var) = &for_expr.key_var {
            scope.declare_var(key_var.as_str(), key);
        }
        scope.declare_var(for_expr.value_var.as_str(), value);

        if let Some(cond) = &for_expr.cond_expr {
            if !expect_bool(&evaluate(cond, &scope)?)? {
                continue;
            }
        }

        let item = evaluate(&for_expr.value_expr, &scope)?;

        match &for_expr.key_expr {
            None => tuple.push(item),
            Some(key_expr) => {
                let key = expect_string(&evaluate(key_expr, &scope)?)?;
                if for_expr.grouping {
                    if let Value::Array(group) =
                        object.entry(key).or_insert_with(|| Value::Array(Vec::new()))
                    {
                        group.push(item);
                    }
                } else if object.contains_key(&key) {
                    return Err(EvalError::InvalidArgument {
                        function: "for".to_string(),
                        message: format!("duplicate object key \"{}\"", key),
                    });
                } else {
                    object.insert(key, item);
                }
            }
        }
    }

    if for_expr.key_expr.is_some() {
        Ok(Value::Object(object))
    } else {
        Ok(Value::Array(tuple))
    }
}

/// Key/value pairs of a collection: index for tuples, key for objects
fn iterate(collection: &Value) -> EvalResult<Vec<(Value, Value)>> {
    match collection {
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i as u64), v.clone()))
            .collect()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect()),
        other => Err(EvalError::type_mismatch("collection", other)),
    }
}
