//! Structural diff between a remote resource and its manifest
//!
//! Both sides are normalized first: server-managed `status` is dropped, maps
//! are key-sorted and arrays are ordered by content. The normalized values are
//! rendered as YAML and compared line by line.

use serde_json::{Map, Value};
use similar::TextDiff;

/// Top-level fields owned by the server
const SERVER_FIELDS: [&str; 1] = ["status"];

/// Lines of context around each change
const CONTEXT_LINES: usize = 3;

/// Canonical form used for comparison
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.clone(), normalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(normalize).collect();
            items.sort_by_cached_key(|v| v.to_string());
            Value::Array(items)
        }
        other => other.clone(),
    }
}

fn strip_server_fields(value: &Value) -> Value {
    let mut value = value.clone();
    if let Value::Object(map) = &mut value {
        for field in SERVER_FIELDS {
            map.remove(field);
        }
    }
    value
}

fn render(value: &Value) -> Result<String, String> {
    serde_yaml::to_string(&normalize(&strip_server_fields(value))).map_err(|e| e.to_string())
}

/// Unified diff from `current` (absent for a new resource) to `desired`
///
/// Returns `None` when both sides are equal after normalization.
pub fn resource_diff(current: Option<&Value>, desired: &Value, label: &str) -> Result<Option<String>, String> {
    let old = match current {
        Some(current) => render(current)?,
        None => String::new(),
    };
    let new = render(desired)?;
    if old == new {
        return Ok(None);
    }

    let diff = TextDiff::from_lines(&old, &new);
    let text = diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("{} (remote)", label), &format!("{} (local)", label))
        .to_string();
    Ok(Some(text))
}
