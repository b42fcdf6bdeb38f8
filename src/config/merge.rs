//! Deep merge of JSON descriptors.
//!
//! Implements key-by-key merging where later descriptors override earlier ones.
//! Arrays are replaced entirely, not concatenated.

use serde_json::{Map, Value};

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans and nulls in overlay replace base entirely
///
/// # Example
/// ```
/// use serde_json::json;
/// use pinf_config::config::deep_merge;
///
/// let base = json!({
///     "config": { ".": { "port": 8080, "host": "localhost" } },
///     "extends": ["a", "b"]
/// });
/// let overlay = json!({
///     "config": { ".": { "port": 9000 } },
///     "extends": ["c"]
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(result["config"]["."]["host"], "localhost");
/// assert_eq!(result["config"]["."]["port"], 9000);
/// assert_eq!(result["extends"], json!(["c"]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => {
                        let merged = deep_merge(base_value.take(), overlay_value);
                        *base_value = merged;
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
///
/// Starts from an empty object, so an empty input yields `{}`.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values
        .into_iter()
        .fold(Value::Object(Map::new()), deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_simple_objects() {
        let base = json!({"a": 1, "b": 2});
        let overlay = json!({"b": 3, "c": 4});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_merge_namespaced_config() {
        let base = json!({
            "config": {".": {"host": "localhost", "port": 8080}},
            "uid": "github.com/pinf/app"
        });
        let overlay = json!({
            "config": {".": {"port": 9000}, "github.com/pinf/app": {"debug": true}}
        });
        let result = deep_merge(base, overlay);
        assert_eq!(
            result,
            json!({
                "config": {
                    ".": {"host": "localhost", "port": 9000},
                    "github.com/pinf/app": {"debug": true}
                },
                "uid": "github.com/pinf/app"
            })
        );
    }

    #[test]
    fn test_arrays_replaced_not_merged() {
        let base = json!({"extends": ["a", "b", "c"]});
        let overlay = json!({"extends": ["d"]});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"extends": ["d"]}));
    }

    #[test]
    fn test_null_overlay_replaces() {
        let base = json!({"a": 1, "b": {"c": 2}});
        let overlay = json!({"a": null});
        let result = deep_merge(base, overlay);
        assert_eq!(result, json!({"a": null, "b": {"c": 2}}));
    }

    #[test]
    fn test_merge_all_starts_from_empty_object() {
        assert_eq!(deep_merge_all(Vec::new()), json!({}));

        let values = vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3, "c": 4})];
        assert_eq!(deep_merge_all(values), json!({"a": 3, "b": 2, "c": 4}));
    }

    #[test]
    fn test_merge_is_associative_by_precedence() {
        let sources = vec![
            json!({"config": {".": {"a": 1, "nested": {"x": 1}}}}),
            json!({"config": {".": {"a": 2}}, "env": {".": {"A": "1"}}}),
            json!({"config": {".": {"nested": {"y": 2}}}}),
            json!({"config": {".": {"nested": {"x": 3}}}, "main": "a.js"}),
            json!({"config": {"uid": {"b": [1, 2]}}}),
            json!({"config": {"uid": {"b": [3]}}, "main": "b.js"}),
        ];

        let all = deep_merge_all(sources.clone());
        let head = deep_merge_all(sources[..3].to_vec());
        let tail = deep_merge_all(sources[3..].to_vec());

        assert_eq!(all, deep_merge(head, tail));
    }

    #[test]
    fn test_overlay_replaces_primitive_with_object() {
        let base = json!({"value": 42});
        let overlay = json!({"value": {"nested": true}});
        assert_eq!(deep_merge(base, overlay), json!({"value": {"nested": true}}));
    }

    #[test]
    fn test_overlay_replaces_object_with_primitive() {
        let base = json!({"value": {"nested": true}});
        let overlay = json!({"value": 42});
        assert_eq!(deep_merge(base, overlay), json!({"value": 42}));
    }
}
