//! `${VAR}` and `${VAR:-default}` placeholders in config values.
//!
//! Substitution walks the parsed value tree rather than the raw file, so a
//! resolved value can never alter the file's syntax. A string that is exactly
//! one placeholder takes the type of what it resolves to: an id written as
//! `guild_id = "${GATEHOUSE_GUILD_ID}"` still deserializes as a number.

use serde_json::Value;

/// A placeholder with no value in the environment and no default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    /// Dotted config path holding the placeholder.
    pub path: String,
    pub var: String,
}

/// Substitute placeholders in every string of `value` from the process
/// environment. Unresolved placeholders are left as written and reported.
pub fn substitute_env(value: &mut Value) -> Vec<Unresolved> {
    substitute_env_with(value, |name| std::env::var(name).ok())
}

pub(crate) fn substitute_env_with(
    value: &mut Value,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<Unresolved> {
    let mut unresolved = Vec::new();
    walk(value, "", &lookup, &mut unresolved);
    unresolved
}

fn walk(
    value: &mut Value,
    path: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    unresolved: &mut Vec<Unresolved>,
) {
    match value {
        Value::String(s) => {
            let mut missing = Vec::new();
            let whole = is_single_placeholder(s);
            let expanded = expand(s, lookup, &mut missing);
            unresolved.extend(missing.into_iter().map(|var| Unresolved {
                path: path.to_string(),
                var,
            }));
            *value = if whole {
                typed(expanded)
            } else {
                Value::String(expanded)
            };
        },
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                walk(item, &format!("{path}[{i}]"), lookup, unresolved);
            }
        },
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(item, &child, lookup, unresolved);
            }
        },
        Value::Null | Value::Bool(_) | Value::Number(_) => {},
    }
}

fn is_single_placeholder(s: &str) -> bool {
    s.strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .is_some_and(|inner| !inner.is_empty() && !inner.contains(['{', '}', '$']))
}

/// Numbers and booleans produced by a whole-string placeholder keep their
/// type; anything else stays a string.
fn typed(resolved: String) -> Value {
    if let Ok(n) = resolved.parse::<u64>() {
        return Value::from(n);
    }
    match resolved.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(resolved),
    }
}

fn expand(
    input: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    missing: &mut Vec<String>,
) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated: keep the remainder verbatim.
            out.push_str(&rest[start..]);
            return out;
        };
        let body = &after[..end];
        let (name, default) = match body.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };
        match lookup(name).filter(|v| !v.is_empty()).or(default.map(str::to_string)) {
            Some(resolved) if !name.is_empty() => out.push_str(&resolved),
            _ => {
                if !name.is_empty() {
                    missing.push(name.to_string());
                }
                out.push_str(&rest[start..start + 3 + end]);
            },
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
