use serde_json::Value;

use super::{num_arg, num_value};
use crate::context::{Function, FunctionTable};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert(
        "abs".into(),
        Function::new(1, |args| num_value(num_arg(args, 0)?.abs())),
    );
    table.insert(
        "ceil".into(),
        Function::new(1, |args| num_value(num_arg(args, 0)?.ceil())),
    );
    table.insert(
        "floor".into(),
        Function::new(1, |args| num_value(num_arg(args, 0)?.floor())),
    );
    table.insert(
        "int".into(),
        Function::new(1, |args| num_value(num_arg(args, 0)?.trunc())),
    );
    table.insert(
        "max".into(),
        Function::variadic(1, |args| fold(args, f64::max)),
    );
    table.insert(
        "min".into(),
        Function::variadic(1, |args| fold(args, f64::min)),
    );
}

fn fold(args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, String> {
    let mut acc = num_arg(args, 0)?;
    for i in 1..args.len() {
        acc = f(acc, num_arg(args, i)?);
    }
    num_value(acc)
}
