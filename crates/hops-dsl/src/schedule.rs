//! Cron expressions for `schedule` blocks

use croner::Cron;

/// Parse a standard five-field cron expression or one of the `@` shorthands
pub fn parse_cron(expr: &str) -> Result<Cron, String> {
    let expr = expr.trim();
    let pattern = match expr {
        "" => return Err("cron must not be empty".to_string()),
        "@yearly" | "@annually" => "0 0 1 1 *",
        "@monthly" => "0 0 1 * *",
        "@weekly" => "0 0 * * 0",
        "@daily" | "@midnight" => "0 0 * * *",
        "@hourly" => "0 * * * *",
        other if other.starts_with('@') => {
            return Err(format!("unsupported shorthand '{}'", other));
        }
        other => other,
    };

    let fields = pattern.split_whitespace().count();
    if fields != 5 {
        return Err(format!("expected 5 fields, found {}", fields));
    }

    Cron::new(pattern).parse().map_err(|e| e.to_string())
}
