// Taskweave — `{{placeholder}}` interpolation against an execution context

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex")
});

/// Whether `name` can be referenced as `{{name}}`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unresolved variable '{0}'")]
    UnresolvedVariable(String),
}

/// Anything that can answer a variable lookup.
pub trait VariableScope {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl VariableScope for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// String form of a value as it appears inside interpolated text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve every placeholder in `text` in one left-to-right pass.
///
/// Substituted values are copied verbatim and never re-scanned, so a value
/// containing `{{...}}` stays literal.
pub fn resolve(text: &str, scope: &impl VariableScope) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = scope
            .lookup(name.as_str())
            .ok_or_else(|| TemplateError::UnresolvedVariable(name.as_str().to_string()))?;
        out.push_str(&text[last..whole.start()]);
        out.push_str(&stringify(value));
        last = whole.end();
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Resolve strings anywhere inside a JSON value; other scalars pass through.
pub fn resolve_value(value: &Value, scope: &impl VariableScope) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => Ok(Value::String(resolve(s, scope)?)),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve a step's parameter map.
///
/// Keys are visited in sorted order so the first missing variable reported
/// does not depend on hash order.
pub fn resolve_params(
    params: &HashMap<String, Value>,
    scope: &impl VariableScope,
) -> Result<HashMap<String, Value>, TemplateError> {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    let mut out = HashMap::with_capacity(params.len());
    for key in keys {
        out.insert(key.clone(), resolve_value(&params[key], scope)?);
    }
    Ok(out)
}

/// Identifiers referenced by `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
