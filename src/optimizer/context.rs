//! User-context pruning.

use serde_json::{Map, Value};

/// Remove `drop_fields` at any depth and cut long strings to `max_chars` plus `marker`.
pub(crate) fn prune_context(
    context: &Map<String, Value>,
    drop_fields: &[String],
    max_chars: usize,
    marker: &str,
) -> Map<String, Value> {
    context
        .iter()
        .filter(|(k, _)| !drop_fields.iter().any(|f| f == *k))
        .map(|(k, v)| (k.clone(), prune_value(v, drop_fields, max_chars, marker)))
        .collect()
}

fn prune_value(value: &Value, drop_fields: &[String], max_chars: usize, marker: &str) -> Value {
    match value {
        Value::String(s) => Value::String(truncate(s, max_chars, marker)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| prune_value(v, drop_fields, max_chars, marker))
                .collect(),
        ),
        Value::Object(map) => Value::Object(prune_context(map, drop_fields, max_chars, marker)),
        other => other.clone(),
    }
}

fn truncate(s: &str, max_chars: usize, marker: &str) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &s[..cut], marker),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<String> {
        vec!["createdAt".into(), "metadata".into()]
    }

    #[test]
    fn test_drops_fields_at_any_depth() {
        let ctx = json!({
            "createdAt": "2024-01-01",
            "profile": {"name": "sam", "metadata": {"v": 1}},
            "history": [{"createdAt": "x", "meal": "soup"}]
        });
        let pruned = prune_context(ctx.as_object().unwrap(), &fields(), 100, "…");
        assert_eq!(
            Value::Object(pruned),
            json!({"profile": {"name": "sam"}, "history": [{"meal": "soup"}]})
        );
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let ctx = json!({"notes": "héllo wörld", "n": 5});
        let pruned = prune_context(ctx.as_object().unwrap(), &[], 5, "[cut]");
        assert_eq!(pruned["notes"], "héllo[cut]");
        assert_eq!(pruned["n"], 5);

        let exact = json!({"notes": "hello"});
        let pruned = prune_context(exact.as_object().unwrap(), &[], 5, "[cut]");
        assert_eq!(pruned["notes"], "hello");
    }
}
