//! Variable substitution over action configuration.
//!
//! A placeholder is `{key}` or `{path.to.key}`. It is replaced by the value
//! found in the execution data; placeholders without a value are left in the
//! text untouched. Strings are inserted as-is, numbers, booleans and `null`
//! through their JSON text, objects and arrays as compact JSON.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::common::Vars;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_][A-Za-z0-9_.\-]*)\}").expect("placeholder pattern is valid"));

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every resolvable placeholder in `template`.
pub fn resolve_template(
    data: &Vars,
    template: &str,
) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match data.lookup(&caps[1]) {
            Some(value) => stringify(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Resolve placeholders in a JSON value recursively.
///
/// A string that is exactly one placeholder is replaced by the raw value, so
/// `"{order.items}"` yields the array itself rather than its JSON text.
pub fn resolve_json_value(
    data: &Vars,
    value: &Value,
) -> Value {
    match value {
        Value::String(s) => {
            if let Some(caps) = PLACEHOLDER.captures(s) {
                if caps[0].len() == s.len() {
                    if let Some(raw) = data.lookup(&caps[1]) {
                        return raw.clone();
                    }
                }
            }
            Value::String(resolve_template(data, s))
        }
        Value::Array(arr) => Value::Array(arr.iter().map(|v| resolve_json_value(data, v)).collect()),
        Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), resolve_json_value(data, v))).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn data() -> Vars {
        Vars::from(json!({
            "name": "Alice",
            "count": 42,
            "active": true,
            "order": {"id": "o-1", "items": ["a", "b"]},
            "a1": {"status_code": 200}
        }))
    }

    #[test]
    fn test_no_placeholders() {
        assert_eq!(resolve_template(&data(), "hello world"), "hello world");
    }

    #[test]
    fn test_replaces_every_occurrence() {
        assert_eq!(resolve_template(&data(), "{name}, {name}!"), "Alice, Alice!");
    }

    #[test]
    fn test_leaves_unmatched_placeholders() {
        assert_eq!(resolve_template(&data(), "Hi {name}, code {coupon}"), "Hi Alice, code {coupon}");
    }

    #[test]
    fn test_scalars_are_stringified() {
        assert_eq!(resolve_template(&data(), "{count} items, active={active}"), "42 items, active=true");
    }

    #[test]
    fn test_nested_path() {
        assert_eq!(resolve_template(&data(), "order {order.id} -> {a1.status_code}"), "order o-1 -> 200");
    }

    #[test]
    fn test_objects_render_as_json() {
        assert_eq!(resolve_template(&data(), "items={order.items}"), r#"items=["a","b"]"#);
    }

    #[test]
    fn test_json_braces_are_not_placeholders() {
        let body = r#"{"name": "{name}"}"#;
        assert_eq!(resolve_template(&data(), body), r#"{"name": "Alice"}"#);
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let data = Vars::from(json!({"a": "{b}", "b": "x"}));
        assert_eq!(resolve_template(&data, "{a}"), "{b}");
    }

    #[test]
    fn test_resolve_json_value_recurses() {
        let input = json!({
            "to": "{name}",
            "meta": {"count": "{count}", "label": "n={count}"},
            "list": ["{order.id}", 7],
            "flag": false
        });
        assert_eq!(
            resolve_json_value(&data(), &input),
            json!({
                "to": "Alice",
                "meta": {"count": 42, "label": "n=42"},
                "list": ["o-1", 7],
                "flag": false
            })
        );
    }

    #[test]
    fn test_resolve_json_value_keeps_raw_arrays() {
        assert_eq!(resolve_json_value(&data(), &json!("{order.items}")), json!(["a", "b"]));
        assert_eq!(resolve_json_value(&data(), &json!("{missing}")), json!("{missing}"));
    }
}
