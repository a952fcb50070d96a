//! Dot-notation flattening of nested telemetry objects
//!
//! Only objects are recursed into. Any other value (including arrays)
//! terminates the path and is emitted as a leaf, rendered to text without
//! assuming numeric or string content.

use serde_json::Value;

/// Separator between nested key segments
pub const KEY_SEPARATOR: &str = ".";

/// Render a leaf value as stored text
pub fn leaf_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Join a parent path and a child key
pub fn join_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}{}{}", p, KEY_SEPARATOR, key),
        _ => key.to_string(),
    }
}

/// Flatten `value` into sorted `(path, text)` pairs
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    flatten_excluding(value, None, &[])
}

/// Flatten `value`, prepending `prefix` to every emitted path
pub fn flatten_prefixed(value: &Value, prefix: &str) -> Vec<(String, String)> {
    flatten_excluding(value, Some(prefix), &[])
}

/// Flatten `value`, skipping the named branches at the top level only.
///
/// A non-object `value` yields a single leaf keyed by `prefix`, or nothing
/// when there is no prefix to name it.
pub fn flatten_excluding(
    value: &Value,
    prefix: Option<&str>,
    excluded_roots: &[&str],
) -> Vec<(String, String)> {
    let mut out = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if excluded_roots.contains(&key.as_str()) {
                    continue;
                }
                visit(child, join_key(prefix, key), &mut out);
            }
        }
        leaf => {
            if let Some(p) = prefix.filter(|p| !p.is_empty()) {
                out.push((p.to_string(), leaf_text(leaf)));
            }
        }
    }
    out.sort();
    out
}

fn visit(value: &Value, path: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                visit(child, join_key(Some(&path), key), out);
            }
        }
        leaf => out.push((path, leaf_text(leaf))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_objects() {
        let value = json!({
            "service": {"proto-fd-max": 15000, "cluster-name": "prod"},
            "network": {"heartbeat": {"mode": "mesh", "interval": 150}},
            "enabled": true
        });

        let flat = flatten(&value);
        assert_eq!(
            flat,
            vec![
                ("enabled".to_string(), "true".to_string()),
                ("network.heartbeat.interval".to_string(), "150".to_string()),
                ("network.heartbeat.mode".to_string(), "mesh".to_string()),
                ("service.cluster-name".to_string(), "prod".to_string()),
                ("service.proto-fd-max".to_string(), "15000".to_string()),
            ]
        );
    }

    #[test]
    fn test_arrays_are_leaves() {
        let value = json!({"seeds": ["10.0.0.1", "10.0.0.2"], "empty": {}});
        let flat = flatten(&value);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].0, "seeds");
        assert_eq!(flat[0].1, r#"["10.0.0.1","10.0.0.2"]"#);
    }

    #[test]
    fn test_flatten_is_order_independent() {
        let a: Value =
            serde_json::from_str(r#"{"b": {"y": 1, "x": "2"}, "a": 3}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"a": 3, "b": {"x": "2", "y": 1}}"#).unwrap();
        assert_eq!(flatten(&a), flatten(&b));
        assert_eq!(flatten(&a), flatten(&a));
    }

    #[test]
    fn test_excluded_roots_only_apply_at_top_level() {
        let value = json!({
            "statistics": {"objects": 10},
            "latency": {"read": 1},
            "namespace": {"test": {"statistics": "kept"}}
        });
        let flat = flatten_excluding(&value, None, &["statistics", "latency"]);
        assert_eq!(
            flat,
            vec![(
                "namespace.test.statistics".to_string(),
                "kept".to_string()
            )]
        );
    }

    #[test]
    fn test_prefixed_scalar() {
        assert_eq!(
            flatten_prefixed(&json!(5), "service.objects"),
            vec![("service.objects".to_string(), "5".to_string())]
        );
        assert!(flatten(&json!(5)).is_empty());
    }
}
