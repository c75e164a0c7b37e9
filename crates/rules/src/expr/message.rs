//! Positive-message token substitution.
//!
//! Tokens are case-sensitive: `$DATETIME`, `$VALUE`, `$TSID[0]` .. `$TSID[9]`.

use chrono::NaiveDateTime;

const MAX_TSID_TOKENS: usize = 10;

pub fn format_datetime(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Integral values print without a fractional part (`75`, not `75.0`).
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

pub fn substitute(template: &str, t: NaiveDateTime, value: f64, tsids: &[&str]) -> String {
    let mut out = template.to_string();
    for i in 0..MAX_TSID_TOKENS {
        let token = format!("$TSID[{i}]");
        if out.contains(&token) {
            out = out.replace(&token, tsids.get(i).copied().unwrap_or(""));
        }
    }
    out.replace("$DATETIME", &format_datetime(t))
        .replace("$VALUE", &format_value(value))
}
