use regex::Regex;
use serde_json::{Map, Value};

use super::{int_arg, list_arg, str_arg};
use crate::context::{FuncResult, Function, FunctionTable};
use crate::value::{as_number, as_string, type_name};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("chomp".into(), Function::new(1, |args| {
        let s = str_arg(args, 0)?;
        Ok(Value::String(s.trim_end_matches(['\n', '\r']).to_string()))
    }));
    table.insert("format".into(), Function::variadic(1, format));
    table.insert("indent".into(), Function::new(2, |args| {
        let spaces = int_arg(args, 0)?.max(0) as usize;
        let s = str_arg(args, 1)?;
        Ok(Value::String(indent(spaces, &s)))
    }));
    table.insert("join".into(), Function::variadic(2, join));
    table.insert("lower".into(), Function::new(1, |args| {
        Ok(Value::String(str_arg(args, 0)?.to_lowercase()))
    }));
    table.insert("upper".into(), Function::new(1, |args| {
        Ok(Value::String(str_arg(args, 0)?.to_uppercase()))
    }));
    table.insert("replace".into(), Function::new(3, |args| {
        let s = str_arg(args, 0)?;
        let from = str_arg(args, 1)?;
        let to = str_arg(args, 2)?;
        Ok(Value::String(s.replace(&from, &to)))
    }));
    table.insert("regex".into(), Function::new(2, regex_all));
    table.insert("regexreplace".into(), Function::new(3, |args| {
        let s = str_arg(args, 0)?;
        let re = compile(&str_arg(args, 1)?)?;
        let to = str_arg(args, 2)?;
        Ok(Value::String(re.replace_all(&s, to.as_str()).into_owned()))
    }));
    table.insert("reverse".into(), Function::new(1, |args| match &args[0] {
        Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
        _ => Ok(Value::String(str_arg(args, 0)?.chars().rev().collect())),
    }));
    table.insert("split".into(), Function::new(2, |args| {
        let sep = str_arg(args, 0)?;
        let s = str_arg(args, 1)?;
        Ok(Value::Array(
            s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect(),
        ))
    }));
    table.insert("strlen".into(), Function::new(1, |args| {
        Ok(Value::from(str_arg(args, 0)?.chars().count()))
    }));
    table.insert("substr".into(), Function::new(3, |args| {
        let s = str_arg(args, 0)?;
        Ok(Value::String(substr(&s, int_arg(args, 1)?, int_arg(args, 2)?)))
    }));
    table.insert("title".into(), Function::new(1, |args| {
        Ok(Value::String(title(&str_arg(args, 0)?)))
    }));
    table.insert("trim".into(), Function::new(2, |args| {
        let s = str_arg(args, 0)?;
        let cutset: Vec<char> = str_arg(args, 1)?.chars().collect();
        Ok(Value::String(s.trim_matches(cutset.as_slice()).to_string()))
    }));
    table.insert("trimprefix".into(), Function::new(2, |args| {
        let s = str_arg(args, 0)?;
        let prefix = str_arg(args, 1)?;
        Ok(Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()))
    }));
    table.insert("trimsuffix".into(), Function::new(2, |args| {
        let s = str_arg(args, 0)?;
        let suffix = str_arg(args, 1)?;
        Ok(Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string()))
    }));
    table.insert("trimspace".into(), Function::new(1, |args| {
        Ok(Value::String(str_arg(args, 0)?.trim().to_string()))
    }));
}

fn compile(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("invalid regular expression: {}", e))
}

fn indent(spaces: usize, s: &str) -> String {
    s.replace('\n', &format!("\n{}", " ".repeat(spaces)))
}

fn join(args: &[Value]) -> FuncResult {
    let sep = str_arg(args, 0)?;
    let mut parts = Vec::new();
    for i in 1..args.len() {
        for item in list_arg(args, i)? {
            match as_string(item) {
                Some(s) => parts.push(s),
                None => return Err(format!("cannot join a {}", type_name(item))),
            }
        }
    }
    Ok(Value::String(parts.join(&sep)))
}

/// All matches of a pattern
///
/// Without capture groups each match is a string. Named groups produce a map
/// per match, positional groups a list per match.
fn regex_all(args: &[Value]) -> FuncResult {
    let re = compile(&str_arg(args, 0)?)?;
    let s = str_arg(args, 1)?;
    let names: Vec<Option<&str>> = re.capture_names().skip(1).collect();
    let named = names.iter().any(Option::is_some);

    let mut matches = Vec::new();
    for caps in re.captures_iter(&s) {
        let group = |i: usize| {
            caps.get(i)
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null)
        };

        if names.is_empty() {
            matches.push(group(0));
        } else if named {
            let mut map = Map::new();
            for (i, name) in names.iter().enumerate() {
                if let Some(name) = name {
                    map.insert(name.to_string(), group(i + 1));
                }
            }
            matches.push(Value::Object(map));
        } else {
            matches.push(Value::Array((1..=names.len()).map(group).collect()));
        }
    }
    Ok(Value::Array(matches))
}

fn substr(s: &str, offset: i64, length: i64) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = if length < 0 { len } else { (start + length).min(len) };
    chars[start as usize..end as usize].iter().collect()
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

/// printf-style formatting with the `%v %s %d %f %e %g %t %q %x %X %o %b %%` verbs
fn format(args: &[Value]) -> FuncResult {
    let spec = str_arg(args, 0)?;
    let mut values = args[1..].iter();
    let mut out = String::new();
    let mut chars = spec.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut flags = Flags::default();
        while let Some(&f) = chars.peek() {
            match f {
                '-' => flags.left = true,
                '+' => flags.plus = true,
                '0' => flags.zero = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                p.push(d);
                chars.next();
            }
            precision = Some(p.parse::<usize>().unwrap_or(0));
        }

        let verb = chars
            .next()
            .ok_or_else(|| "format string ends with an incomplete verb".to_string())?;
        if verb == '%' {
            out.push('%');
            continue;
        }

        let value = values
            .next()
            .ok_or_else(|| format!("not enough arguments for %{}", verb))?;
        let body = format_verb(verb, value, precision, flags.plus)?;
        let numeric = matches!(verb, 'd' | 'f' | 'e' | 'g' | 'x' | 'X' | 'o' | 'b');
        out.push_str(&pad(body, width.parse().unwrap_or(0), &flags, numeric));
    }

    if values.next().is_some() {
        return Err("too many arguments for format string".to_string());
    }
    Ok(Value::String(out))
}

#[derive(Default)]
struct Flags {
    left: bool,
    plus: bool,
    zero: bool,
}

fn format_verb(verb: char, value: &Value, precision: Option<usize>, plus: bool) -> Result<String, String> {
    let number = || {
        as_number(value).ok_or_else(|| format!("%{} requires a number, got {}", verb, type_name(value)))
    };
    let integer = || -> Result<i64, String> {
        let n = number()?;
        if n.fract() != 0.0 {
            return Err(format!("%{} requires a whole number, got {}", verb, n));
        }
        Ok(n as i64)
    };
    let signed = |s: String, negative: bool| {
        if plus && !negative {
            format!("+{}", s)
        } else {
            s
        }
    };

    let body = match verb {
        'v' => match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => as_string(other).unwrap_or_else(|| other.to_string()),
        },
        's' => {
            let s = as_string(value)
                .ok_or_else(|| format!("%s requires a string, got {}", type_name(value)))?;
            match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            }
        }
        'q' => {
            let s = as_string(value)
                .ok_or_else(|| format!("%q requires a string, got {}", type_name(value)))?;
            Value::String(s).to_string()
        }
        't' => match value {
            Value::Bool(b) => b.to_string(),
            other => return Err(format!("%t requires a bool, got {}", type_name(other))),
        },
        'd' => {
            let n = integer()?;
            signed(n.to_string(), n < 0)
        }
        'f' => {
            let n = number()?;
            signed(format!("{:.*}", precision.unwrap_or(6), n), n < 0.0)
        }
        'e' => {
            let n = number()?;
            signed(format!("{:.*e}", precision.unwrap_or(6), n), n < 0.0)
        }
        'g' => {
            let n = number()?;
            let s = match precision {
                Some(p) => format!("{:.*}", p, n),
                None => n.to_string(),
            };
            signed(s, n < 0.0)
        }
        'x' => format!("{:x}", integer()?),
        'X' => format!("{:X}", integer()?),
        'o' => format!("{:o}", integer()?),
        'b' => format!("{:b}", integer()?),
        other => return Err(format!("unsupported format verb %{}", other)),
    };
    Ok(body)
}

fn pad(body: String, width: usize, flags: &Flags, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if flags.left {
        format!("{}{}", body, " ".repeat(fill))
    } else if flags.zero && numeric {
        match body.strip_prefix(['-', '+']) {
            Some(digits) => format!("{}{}{}", &body[..1], "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), body),
        }
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}

#[cfg(test)]
mod tests {
    use crate::funcs::stateless_functions;
    use serde_json::{json, Value};

    fn call(name: &str, args: &[Value]) -> Value {
        stateless_functions()[name].call(name, args).unwrap()
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(call("upper", &[json!("abc")]), json!("ABC"));
        assert_eq!(call("lower", &[json!("ABC")]), json!("abc"));
        assert_eq!(call("title", &[json!("hello big world")]), json!("Hello Big World"));
        assert_eq!(call("trim", &[json!("?!hello?!"), json!("!?")]), json!("hello"));
        assert_eq!(call("trimprefix", &[json!("refs/heads/main"), json!("refs/heads/")]), json!("main"));
        assert_eq!(call("trimsuffix", &[json!("file.txt"), json!(".txt")]), json!("file"));
        assert_eq!(call("trimspace", &[json!("  x \n")]), json!("x"));
        assert_eq!(call("chomp", &[json!("line\r\n\n")]), json!("line"));
    }

    #[test]
    fn test_split_join() {
        assert_eq!(call("split", &[json!(","), json!("a,b")]), json!(["a", "b"]));
        assert_eq!(
            call("join", &[json!("-"), json!(["a", "b"]), json!(["c"])]),
            json!("a-b-c")
        );
    }

    #[test]
    fn test_substr_and_strlen() {
        assert_eq!(call("substr", &[json!("hello world"), json!(1), json!(4)]), json!("ello"));
        assert_eq!(call("substr", &[json!("hello world"), json!(-5), json!(-1)]), json!("world"));
        assert_eq!(call("strlen", &[json!("héllo")]), json!(5));
        assert_eq!(call("reverse", &[json!("abc")]), json!("cba"));
    }

    #[test]
    fn test_indent() {
        assert_eq!(
            call("indent", &[json!(2), json!("a\nb\n")]),
            json!("a\n  b\n  ")
        );
    }

    #[test]
    fn test_regex_returns_all_matches() {
        assert_eq!(
            call("regex", &[json!("[a-z]+"), json!("abc 123 def")]),
            json!(["abc", "def"])
        );
        assert_eq!(
            call("regex", &[json!("(\\d)(\\d)"), json!("12 34")]),
            json!([["1", "2"], ["3", "4"]])
        );
        assert_eq!(
            call("regex", &[json!("(?P<major>\\d+)\\.(?P<minor>\\d+)"), json!("v1.2")]),
            json!([{"major": "1", "minor": "2"}])
        );
        assert_eq!(call("regex", &[json!("x"), json!("abc")]), json!([]));
    }

    #[test]
    fn test_replace() {
        assert_eq!(call("replace", &[json!("a-b-c"), json!("-"), json!("+")]), json!("a+b+c"));
        assert_eq!(
            call("regexreplace", &[json!("v1.2.3"), json!("\\d"), json!("x")]),
            json!("vx.x.x")
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(call("format", &[json!("Hello, %s!"), json!("Ander")]), json!("Hello, Ander!"));
        assert_eq!(call("format", &[json!("%03d|%-4s|"), json!(7), json!("ab")]), json!("007|ab  |"));
        assert_eq!(call("format", &[json!("%.2f%%"), json!(3.14159)]), json!("3.14%"));
        assert_eq!(call("format", &[json!("%q %t"), json!("x"), json!(true)]), json!("\"x\" true"));
        assert!(stateless_functions()["format"]
            .call("format", &[json!("%s %s"), json!("a")])
            .is_err());
    }
}
