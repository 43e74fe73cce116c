//! Deep merge of configuration layers.
//!
//! Mappings merge key by key; any other value from a higher tier replaces the
//! lower one. Lists are replaced, never concatenated.

use serde_json::Value;

/// Merge `overlay` onto `base`. A null in `overlay` means "not specified"
/// and keeps the base value.
///
/// ```
/// use serde_json::json;
/// use ansible_mcp::config::deep_merge;
///
/// let base = json!({"exec": {"ansible": "ansible", "ansible_vault": "ansible-vault"}});
/// let overlay = json!({"exec": {"ansible": "/opt/bin/ansible"}});
/// assert_eq!(
///     deep_merge(base, overlay),
///     json!({"exec": {"ansible": "/opt/bin/ansible", "ansible_vault": "ansible-vault"}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Fold `deep_merge` over `values`, later values winning.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_mappings_merge() {
        let base = json!({"server": {"default_format": "json", "registry_path": null}, "x": 1});
        let overlay = json!({"server": {"default_format": "markdown"}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({"server": {"default_format": "markdown", "registry_path": null}, "x": 1})
        );
    }

    #[test]
    fn lists_are_replaced() {
        let result = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(result, json!({"items": [4]}));
    }

    #[test]
    fn null_keeps_base() {
        let result = deep_merge(json!({"a": 1, "b": {"c": 2}}), json!({"a": null, "b": {"c": null}}));
        assert_eq!(result, json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn shape_changes_take_the_overlay() {
        assert_eq!(deep_merge(json!({"v": 42}), json!({"v": {"n": true}})), json!({"v": {"n": true}}));
        assert_eq!(deep_merge(json!({"v": {"n": true}}), json!({"v": 42})), json!({"v": 42}));
    }

    #[test]
    fn merge_all_in_order() {
        let result = deep_merge_all(vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3})]);
        assert_eq!(result, json!({"a": 3, "b": 2}));
    }
}
