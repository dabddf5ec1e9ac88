use serde_json::{Map, Value};

use super::{int_arg, list_arg, map_arg, num_arg, num_value, str_arg};
use crate::context::{FuncResult, Function, FunctionTable};
use crate::eval::values_equal;
use crate::value::{as_string, type_name};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("coalesce".into(), Function::variadic(1, |args| {
        args.iter()
            .find(|v| !v.is_null() && v.as_str() != Some(""))
            .cloned()
            .ok_or_else(|| "no non-null, non-empty-string arguments".to_string())
    }));
    table.insert("compact".into(), Function::new(1, |args| {
        Ok(Value::Array(
            list_arg(args, 0)?
                .iter()
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .collect(),
        ))
    }));
    table.insert("concat".into(), Function::variadic(1, |args| {
        let mut out = Vec::new();
        for i in 0..args.len() {
            out.extend(list_arg(args, i)?.iter().cloned());
        }
        Ok(Value::Array(out))
    }));
    table.insert("flatten".into(), Function::new(1, |args| {
        let mut out = Vec::new();
        flatten_into(list_arg(args, 0)?, &mut out);
        Ok(Value::Array(out))
    }));
    table.insert("index".into(), Function::new(2, |args| {
        list_arg(args, 0)?
            .iter()
            .position(|v| values_equal(v, &args[1]))
            .map(Value::from)
            .ok_or_else(|| "item not found".to_string())
    }));
    table.insert("keys".into(), Function::new(1, |args| {
        let mut keys: Vec<&String> = map_arg(args, 0)?.keys().collect();
        keys.sort();
        Ok(Value::Array(keys.into_iter().map(|k| Value::String(k.clone())).collect()))
    }));
    table.insert("values".into(), Function::new(1, |args| {
        let map = map_arg(args, 0)?;
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        Ok(Value::Array(keys.into_iter().map(|k| map[k].clone()).collect()))
    }));
    table.insert("length".into(), Function::new(1, |args| match &args[0] {
        Value::String(s) => Ok(Value::from(s.chars().count())),
        Value::Array(items) => Ok(Value::from(items.len())),
        Value::Object(map) => Ok(Value::from(map.len())),
        other => Err(format!("cannot take the length of a {}", type_name(other))),
    }));
    table.insert("lookup".into(), Function::ranged(2, 3, |args| {
        let map = map_arg(args, 0)?;
        let key = str_arg(args, 1)?;
        match (map.get(&key), args.get(2)) {
            (Some(value), _) => Ok(value.clone()),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(format!("the given key \"{}\" is not present", key)),
        }
    }));
    table.insert("merge".into(), Function::variadic(0, |args| {
        let mut out = Map::new();
        for (i, arg) in args.iter().enumerate() {
            if arg.is_null() {
                continue;
            }
            for (k, v) in map_arg(args, i)? {
                out.insert(k.clone(), v.clone());
            }
        }
        Ok(Value::Object(out))
    }));
    table.insert("range".into(), Function::ranged(1, 3, range));
    table.insert("setintersection".into(), Function::variadic(1, |args| {
        let mut acc = set_of(list_arg(args, 0)?);
        for i in 1..args.len() {
            let other = list_arg(args, i)?;
            acc.retain(|v| contains(other, v));
        }
        Ok(Value::Array(acc))
    }));
    table.insert("setunion".into(), Function::variadic(1, |args| {
        let mut acc = Vec::new();
        for i in 0..args.len() {
            acc.extend(list_arg(args, i)?.iter().cloned());
        }
        Ok(Value::Array(set_of(&acc)))
    }));
    table.insert("setproduct".into(), Function::variadic(2, |args| {
        let mut product: Vec<Vec<Value>> = vec![Vec::new()];
        for i in 0..args.len() {
            let set = set_of(list_arg(args, i)?);
            let mut next = Vec::with_capacity(product.len() * set.len());
            for prefix in &product {
                for item in &set {
                    let mut row = prefix.clone();
                    row.push(item.clone());
                    next.push(row);
                }
            }
            product = next;
        }
        Ok(Value::Array(product.into_iter().map(Value::Array).collect()))
    }));
    table.insert("slice".into(), Function::new(3, |args| {
        let items = list_arg(args, 0)?;
        let start = int_arg(args, 1)?;
        let end = int_arg(args, 2)?;
        if start < 0 || end < start || end as usize > items.len() {
            return Err(format!(
                "invalid slice [{}:{}] of a list with {} elements",
                start,
                end,
                items.len()
            ));
        }
        Ok(Value::Array(items[start as usize..end as usize].to_vec()))
    }));
    table.insert("sort".into(), Function::new(1, |args| {
        let mut strings = Vec::new();
        for item in list_arg(args, 0)? {
            strings.push(as_string(item).ok_or_else(|| {
                format!("sort only supports strings, got {}", type_name(item))
            })?);
        }
        strings.sort();
        Ok(Value::Array(strings.into_iter().map(Value::String).collect()))
    }));
    table.insert("zipmap".into(), Function::new(2, |args| {
        let keys = list_arg(args, 0)?;
        let values = list_arg(args, 1)?;
        if keys.len() != values.len() {
            return Err(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            ));
        }
        let mut out = Map::new();
        for (k, v) in keys.iter().zip(values) {
            let key = as_string(k).ok_or_else(|| format!("keys must be strings, got {}", type_name(k)))?;
            out.insert(key, v.clone());
        }
        Ok(Value::Object(out))
    }));
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) => flatten_into(inner, out),
            other => out.push(other.clone()),
        }
    }
}

fn range(args: &[Value]) -> FuncResult {
    let (start, limit, step) = match args.len() {
        1 => (0.0, num_arg(args, 0)?, 1.0),
        2 => {
            let start = num_arg(args, 0)?;
            let limit = num_arg(args, 1)?;
            (start, limit, if limit >= start { 1.0 } else { -1.0 })
        }
        _ => (num_arg(args, 0)?, num_arg(args, 1)?, num_arg(args, 2)?),
    };

    if step == 0.0 {
        return Err("step must not be zero".to_string());
    }
    if (step > 0.0 && limit < start) || (step < 0.0 && limit > start) {
        return Err("step moves away from the limit".to_string());
    }

    let mut out = Vec::new();
    let mut current = start;
    while (step > 0.0 && current < limit) || (step < 0.0 && current > limit) {
        if out.len() >= 1024 {
            return Err("more than 1024 values were generated".to_string());
        }
        out.push(num_value(current)?);
        current += step;
    }
    Ok(Value::Array(out))
}

fn contains(items: &[Value], value: &Value) -> bool {
    items.iter().any(|v| values_equal(v, value))
}

/// Unique elements, first occurrence wins
pub(super) fn set_of(items: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !contains(&out, item) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::funcs::stateless_functions;
    use serde_json::{json, Value};

    fn call(name: &str, args: &[Value]) -> Value {
        stateless_functions()[name].call(name, args).unwrap()
    }

    fn fails(name: &str, args: &[Value]) -> bool {
        stateless_functions()[name].call(name, args).is_err()
    }

    #[test]
    fn test_list_functions() {
        assert_eq!(call("compact", &[json!(["a", "", null, "b"])]), json!(["a", "b"]));
        assert_eq!(call("concat", &[json!([1]), json!([2, 3])]), json!([1, 2, 3]));
        assert_eq!(call("flatten", &[json!([[1, [2]], 3])]), json!([1, 2, 3]));
        assert_eq!(call("slice", &[json!([1, 2, 3, 4]), json!(1), json!(3)]), json!([2, 3]));
        assert_eq!(call("sort", &[json!(["b", "c", "a"])]), json!(["a", "b", "c"]));
        assert_eq!(call("index", &[json!(["a", "b"]), json!("b")]), json!(1));
        assert!(fails("index", &[json!(["a"]), json!("z")]));
        assert!(fails("slice", &[json!([1]), json!(0), json!(2)]));
    }

    #[test]
    fn test_map_functions() {
        let map = json!({"b": 2, "a": 1});
        assert_eq!(call("keys", &[map.clone()]), json!(["a", "b"]));
        assert_eq!(call("values", &[map.clone()]), json!([1, 2]));
        assert_eq!(call("length", &[map.clone()]), json!(2));
        assert_eq!(call("lookup", &[map.clone(), json!("a")]), json!(1));
        assert_eq!(call("lookup", &[map.clone(), json!("z"), json!(0)]), json!(0));
        assert!(fails("lookup", &[map, json!("z")]));
        assert_eq!(
            call("merge", &[json!({"a": 1}), json!(null), json!({"a": 2, "b": 3})]),
            json!({"a": 2, "b": 3})
        );
        assert_eq!(
            call("zipmap", &[json!(["a", "b"]), json!([1, 2])]),
            json!({"a": 1, "b": 2})
        );
    }

    #[test]
    fn test_range() {
        assert_eq!(call("range", &[json!(3)]), json!([0, 1, 2]));
        assert_eq!(call("range", &[json!(3), json!(1)]), json!([3, 2]));
        assert_eq!(call("range", &[json!(0), json!(10), json!(5)]), json!([0, 5]));
        assert!(fails("range", &[json!(0), json!(1), json!(0)]));
    }

    #[test]
    fn test_sets() {
        assert_eq!(
            call("setunion", &[json!(["a", "b"]), json!(["b", "c"])]),
            json!(["a", "b", "c"])
        );
        assert_eq!(
            call("setintersection", &[json!(["a", "b"]), json!(["b", "c"])]),
            json!(["b"])
        );
        assert_eq!(
            call("setproduct", &[json!(["a", "b"]), json!([1])]),
            json!([["a", 1], ["b", 1]])
        );
    }

    #[test]
    fn test_coalesce() {
        assert_eq!(call("coalesce", &[json!(null), json!(""), json!("x")]), json!("x"));
        assert!(fails("coalesce", &[json!(null)]));
    }
}
