//! Nested query-string keys: `a.b` for object members, `a[0]` for list items.

use serde::Serialize;
use serde_json::Value;

use super::node::Segment;

/// Deepest path a single query key may address.
pub const MAX_KEY_DEPTH: usize = 32;

/// Split a query key into path segments.
pub(crate) fn parse_key(key: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let too_deep = || format!("query key nests deeper than {MAX_KEY_DEPTH}");
    for part in key.split('.') {
        if segments.len() >= MAX_KEY_DEPTH {
            return Err(too_deep());
        }
        let (name, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if name.is_empty() {
            return Err(format!("empty key segment in '{key}'"));
        }
        segments.push(Segment::Key(name.to_owned()));

        while !rest.is_empty() {
            let Some(close) = rest.find(']') else {
                return Err(format!("unclosed index in '{key}'"));
            };
            let idx = rest[1..close]
                .parse::<usize>()
                .map_err(|_| format!("invalid index in '{key}'"))?;
            if segments.len() >= MAX_KEY_DEPTH {
                return Err(too_deep());
            }
            segments.push(Segment::Index(idx));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(format!("unexpected '{rest}' in '{key}'"));
            }
        }
    }
    Ok(segments)
}

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("query values must be objects, got {0}")]
    NotAnObject(&'static str),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Urlencoded(#[from] serde_urlencoded::ser::Error),
}

/// Flatten `value` into a query string using dot / `[index]` keys. Nulls are skipped.
pub fn encode_query<T: Serialize + ?Sized>(value: &T) -> Result<String, EncodeError> {
    let Value::Object(root) = serde_json::to_value(value)? else {
        return Err(EncodeError::NotAnObject("a non-object value"));
    };

    let mut pairs = Vec::new();
    for (key, v) in root {
        flatten(key, v, &mut pairs);
    }
    Ok(serde_urlencoded::to_string(pairs)?)
}

fn flatten(prefix: String, value: Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s)),
        Value::Array(items) => {
            for (i, item) in items.into_iter().enumerate() {
                flatten(format!("{prefix}[{i}]"), item, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                flatten(format!("{prefix}.{k}"), v, out);
            }
        }
    }
}
