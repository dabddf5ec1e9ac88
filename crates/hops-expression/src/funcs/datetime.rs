//! `formatdate` and `timeadd` over RFC 3339 timestamps

use chrono::{DateTime, Datelike, Duration, FixedOffset, SecondsFormat, Timelike};
use serde_json::Value;

use super::str_arg;
use crate::context::{Function, FunctionTable};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("formatdate".into(), Function::new(2, |args| {
        let spec = str_arg(args, 0)?;
        let ts = parse_timestamp(&str_arg(args, 1)?)?;
        format_date(&spec, &ts).map(Value::String)
    }));
    table.insert("timeadd".into(), Function::new(2, |args| {
        let ts = parse_timestamp(&str_arg(args, 0)?)?;
        let duration = parse_duration(&str_arg(args, 1)?)?;
        let shifted = ts
            .checked_add_signed(duration)
            .ok_or_else(|| "resulting time is out of range".to_string())?;
        Ok(Value::String(shifted.to_rfc3339_opts(SecondsFormat::Secs, true)))
    }));
}

fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("not a valid RFC 3339 timestamp \"{}\": {}", s, e))
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Render a timestamp with `YYYY MM DD hh mm ss` style tokens
///
/// Runs of the same letter form a token, other characters are literal and
/// `'quoted text'` is copied as-is (`''` is a literal quote).
fn format_date(spec: &str, ts: &DateTime<FixedOffset>) -> Result<String, String> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            i += 1;
            if chars.get(i) == Some(&'\'') {
                out.push('\'');
                i += 1;
                continue;
            }
            loop {
                match chars.get(i) {
                    None => return Err("unterminated literal in format".to_string()),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        out.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(&other) => {
                        out.push(other);
                        i += 1;
                    }
                }
            }
            continue;
        }

        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && chars[i] == c {
            i += 1;
        }
        let token: String = chars[start..i].iter().collect();
        out.push_str(&render_token(&token, ts)?);
    }

    Ok(out)
}

fn render_token(token: &str, ts: &DateTime<FixedOffset>) -> Result<String, String> {
    let hour12 = match ts.hour() % 12 {
        0 => 12,
        h => h,
    };
    let offset = ts.offset().local_minus_utc();
    let (sign, offset) = if offset < 0 { ('-', -offset) } else { ('+', offset) };
    let (off_h, off_m) = (offset / 3600, (offset % 3600) / 60);

    let rendered = match token {
        "YYYY" => format!("{:04}", ts.year()),
        "YY" => format!("{:02}", ts.year() % 100),
        "MMMM" => MONTHS[ts.month0() as usize].to_string(),
        "MMM" => MONTHS[ts.month0() as usize][..3].to_string(),
        "MM" => format!("{:02}", ts.month()),
        "M" => ts.month().to_string(),
        "DD" => format!("{:02}", ts.day()),
        "D" => ts.day().to_string(),
        "EEEE" => WEEKDAYS[ts.weekday().num_days_from_monday() as usize].to_string(),
        "EEE" => WEEKDAYS[ts.weekday().num_days_from_monday() as usize][..3].to_string(),
        "hh" => format!("{:02}", ts.hour()),
        "h" => ts.hour().to_string(),
        "HH" => format!("{:02}", hour12),
        "H" => hour12.to_string(),
        "AA" => (if ts.hour() < 12 { "AM" } else { "PM" }).to_string(),
        "aa" => (if ts.hour() < 12 { "am" } else { "pm" }).to_string(),
        "mm" => format!("{:02}", ts.minute()),
        "m" => ts.minute().to_string(),
        "ss" => format!("{:02}", ts.second()),
        "s" => ts.second().to_string(),
        "ZZZZZ" => format!("{}{:02}:{:02}", sign, off_h, off_m),
        "ZZZZ" => format!("{}{:02}{:02}", sign, off_h, off_m),
        "ZZZ" if offset == 0 => "UTC".to_string(),
        "ZZZ" => format!("{}{:02}{:02}", sign, off_h, off_m),
        "Z" if offset == 0 => "Z".to_string(),
        "Z" => format!("{}{:02}:{:02}", sign, off_h, off_m),
        other => return Err(format!("invalid date format verb \"{}\"", other)),
    };
    Ok(rendered)
}

/// Parse durations such as `1h30m`, `-10s` or `1.5h`
fn parse_duration(s: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration \"{}\"", s);

    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::zero());
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let value: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_end..];
        total_nanos += value * scale;
    }

    if total_nanos > i64::MAX as f64 {
        return Err(invalid());
    }
    let nanos = total_nanos.round() as i64;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::stateless_functions;
    use serde_json::json;

    fn call(name: &str, args: &[Value]) -> Result<Value, crate::EvalError> {
        stateless_functions()[name].call(name, args)
    }

    #[test]
    fn test_formatdate() {
        let ts = json!("2024-03-05T14:07:09Z");
        assert_eq!(
            call("formatdate", &[json!("YYYY-MM-DD hh:mm:ss"), ts.clone()]).unwrap(),
            json!("2024-03-05 14:07:09")
        );
        assert_eq!(
            call("formatdate", &[json!("EEE, DD MMM YYYY HH:mm AA ZZZ"), ts.clone()]).unwrap(),
            json!("Tue, 05 Mar 2024 02:07 PM UTC")
        );
        assert_eq!(
            call("formatdate", &[json!("'day' D 'of' MMMM"), ts.clone()]).unwrap(),
            json!("day 5 of March")
        );
        assert!(call("formatdate", &[json!("QQ"), ts]).is_err());
    }

    #[test]
    fn test_formatdate_offset() {
        let ts = json!("2024-03-05T14:07:09+05:30");
        assert_eq!(
            call("formatdate", &[json!("ZZZZZ|ZZZZ|Z"), ts]).unwrap(),
            json!("+05:30|+0530|+05:30")
        );
    }

    #[test]
    fn test_timeadd() {
        assert_eq!(
            call("timeadd", &[json!("2024-01-01T00:00:00Z"), json!("1h30m")]).unwrap(),
            json!("2024-01-01T01:30:00Z")
        );
        assert_eq!(
            call("timeadd", &[json!("2024-01-01T00:00:00Z"), json!("-10s")]).unwrap(),
            json!("2023-12-31T23:59:50Z")
        );
        assert!(call("timeadd", &[json!("2024-01-01T00:00:00Z"), json!("5 days")]).is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
    }
}
