//! Value validation against textual rules.
//!
//! Allow-list entries carry a rule string such as `"required,min=1,max=120"`. The
//! translators hand each client value to a [`Validator`] together with that rule and
//! turn rejections into `VALIDATION_ERROR`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Rule-driven validation of a single named value.
pub trait Validator: Send + Sync {
    type Error;

    fn validate_variable(&self, name: &str, value: &Value, rule: &str) -> Result<(), Self::Error>;

    /// Human-readable violations contained in `err`.
    fn error_strings(&self, err: &Self::Error) -> Vec<String>;
}

/// Violations reported by [`RuleValidator`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {}", .violations.join("; "))]
pub struct RuleViolations {
    pub field: String,
    pub violations: Vec<String>,
}

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("static regex should not panic")
});

/// Comma-separated rule language.
///
/// | rule | meaning |
/// |---|---|
/// | `required` | value is not null, `""`, `0`, `false` or an empty collection |
/// | `omitempty` | skip the remaining rules when the value is empty |
/// | `min=N` / `max=N` / `len=N` | numbers by value, strings by chars, arrays by length |
/// | `oneof=a b c` | scalar rendering is one of the listed words |
/// | `email` | string is an e-mail address |
/// | `numeric` | number, or string parsing as one |
/// | `alphanum` | non-empty ASCII letters and digits |
/// | `dive` | remaining rules apply to each array element |
///
/// An empty rule accepts anything. Unknown rules are reported as violations.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleValidator;

impl RuleValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for RuleValidator {
    type Error = RuleViolations;

    fn validate_variable(&self, name: &str, value: &Value, rule: &str) -> Result<(), RuleViolations> {
        let rules: Vec<&str> = rule
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect();

        let mut violations = Vec::new();
        check(value, &rules, "", &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RuleViolations {
                field: name.to_owned(),
                violations,
            })
        }
    }

    fn error_strings(&self, err: &RuleViolations) -> Vec<String> {
        err.violations.clone()
    }
}

fn check(value: &Value, rules: &[&str], path: &str, out: &mut Vec<String>) {
    for (i, rule) in rules.iter().enumerate() {
        let (tag, param) = match rule.split_once('=') {
            Some((t, p)) => (t.trim(), Some(p.trim())),
            None => (*rule, None),
        };

        let violation = match (tag, param) {
            ("omitempty", None) => {
                if is_empty(value) {
                    return;
                }
                None
            }
            ("required", None) => is_empty(value).then(|| "is required".to_owned()),
            ("min", Some(p)) => bound(value, p, |m, n| m >= n, "must be at least"),
            ("max", Some(p)) => bound(value, p, |m, n| m <= n, "must be at most"),
            ("len", Some(p)) => bound(value, p, |m, n| (m - n).abs() < f64::EPSILON, "must have length"),
            ("oneof", Some(p)) => {
                let allowed: Vec<&str> = p.split_whitespace().collect();
                match scalar_text(value) {
                    Some(text) if allowed.contains(&text.as_str()) => None,
                    _ => Some(format!("must be one of [{}]", allowed.join(" "))),
                }
            }
            ("email", None) => match value {
                Value::String(s) if EMAIL_REGEX.is_match(s) => None,
                _ => Some("must be a valid email address".to_owned()),
            },
            ("numeric", None) => match value {
                Value::Number(_) => None,
                Value::String(s) if s.trim().parse::<f64>().is_ok() => None,
                _ => Some("must be numeric".to_owned()),
            },
            ("alphanum", None) => match value {
                Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()) => None,
                _ => Some("must contain only letters and digits".to_owned()),
            },
            ("dive", None) => {
                let rest = &rules[i + 1..];
                match value {
                    Value::Array(items) => {
                        for (idx, item) in items.iter().enumerate() {
                            check(item, rest, &format!("{path}[{idx}]"), out);
                        }
                        return;
                    }
                    _ => {
                        push(out, path, "must be a list".to_owned());
                        return;
                    }
                }
            }
            _ => Some(format!("unknown rule '{rule}'")),
        };

        if let Some(msg) = violation {
            push(out, path, msg);
        }
    }
}

fn push(out: &mut Vec<String>, path: &str, msg: String) {
    if path.is_empty() {
        out.push(msg);
    } else {
        out.push(format!("{path} {msg}"));
    }
}

fn bound(value: &Value, param: &str, ok: impl Fn(f64, f64) -> bool, what: &str) -> Option<String> {
    let Ok(limit) = param.parse::<f64>() else {
        return Some(format!("invalid rule parameter '{param}'"));
    };
    match measure(value) {
        Some(m) if ok(m, limit) => None,
        Some(_) => Some(format!("{what} {param}")),
        None => Some(format!("{what} {param}, got {}", kind(value))),
    }
}

/// Number by value, string by char count, array by length.
#[allow(clippy::cast_precision_loss)]
fn measure(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(a) => Some(a.len() as f64),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
