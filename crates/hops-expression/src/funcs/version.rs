//! `versiontmpl` calendar and pet name placeholders

use chrono::{Datelike, Local};
use serde_json::Value;

use super::str_arg;
use crate::context::{Function, FunctionTable};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("versiontmpl".into(), Function::new(1, |args| {
        Ok(Value::String(template_version(&str_arg(args, 0)?)))
    }));
}

/// Fill `[tag]` placeholders with calendar parts or pet names
///
/// Unknown tags are left in place, brackets included.
pub fn template_version(template: &str) -> String {
    let now = Local::now();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let tag = &after[..close];
        let filled = match tag {
            "pet" => pet_name(1),
            "adj" => first_word(&pet_name(2)),
            "adv" => first_word(&pet_name(3)),
            "calver" => now.format("%Y.%m.%d").to_string(),
            "yyyy" => format!("{:04}", now.year()),
            "yy" => format!("{:02}", now.year() % 100),
            "mm" => format!("{:02}", now.month()),
            "m" => now.month().to_string(),
            "dd" => format!("{:02}", now.day()),
            "d" => now.day().to_string(),
            other => format!("[{}]", other),
        };
        out.push_str(&filled);
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

fn pet_name(words: u8) -> String {
    petname::petname(words, "-").unwrap_or_else(|| "hops".to_string())
}

fn first_word(name: &str) -> String {
    name.split('-').next().unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_tags() {
        let now = Local::now();
        assert_eq!(
            template_version("v[calver]"),
            format!("v{}", now.format("%Y.%m.%d"))
        );
        assert_eq!(
            template_version("[yyyy]-[mm]-[dd]"),
            now.format("%Y-%m-%d").to_string()
        );
        assert_eq!(template_version("[m]"), now.month().to_string());
    }

    #[test]
    fn test_unknown_tags_pass_through() {
        assert_eq!(template_version("[nope]-1"), "[nope]-1");
        assert_eq!(template_version("no tags"), "no tags");
        assert_eq!(template_version("open [yyyy"), "open [yyyy");
    }

    #[test]
    fn test_pet_names() {
        let pet = template_version("[pet]");
        assert!(!pet.is_empty());
        assert!(!pet.contains('-'));
        assert_eq!(template_version("v-[pet]").split('-').count(), 2);
        assert!(!template_version("[adj]").contains('-'));
        assert!(!template_version("[adv]").is_empty());
    }
}
