//! JSON merge patch (RFC 7386).

use serde_json::{Map, Value};

/// Build the merge patch that turns `original` into `modified`.
///
/// Only differing fields are included. Keys present in `original` but absent
/// from `modified` are emitted as `null`, which deletes them on the server.
pub fn merge_patch(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();
            for (key, old) in original {
                match modified.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new) if new != old => {
                        let value = if old.is_object() && new.is_object() {
                            merge_patch(old, new)
                        } else {
                            new.clone()
                        };
                        patch.insert(key.clone(), value);
                    }
                    Some(_) => {}
                }
            }
            for (key, new) in modified {
                if !original.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Apply a merge patch to `target` in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_change_only_sends_label() {
        let original = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "a", "resourceVersion": "7", "labels": {"hello": "world-1"}},
            "data": {"k": "v"}
        });
        let mut modified = original.clone();
        modified["metadata"]["labels"]["hello"] = json!("world-2");

        assert_eq!(
            merge_patch(&original, &modified),
            json!({"metadata": {"labels": {"hello": "world-2"}}})
        );
    }

    #[test]
    fn test_added_and_removed_keys() {
        let original = json!({"a": 1, "b": {"c": 2}});
        let modified = json!({"b": {"c": 2, "d": 3}, "e": [1]});
        assert_eq!(
            merge_patch(&original, &modified),
            json!({"a": null, "b": {"d": 3}, "e": [1]})
        );
    }

    #[test]
    fn test_identical_documents_produce_empty_patch() {
        let doc = json!({"metadata": {"name": "x"}});
        assert_eq!(merge_patch(&doc, &doc), json!({}));
    }

    #[test]
    fn test_apply_inverts_diff() {
        let original = json!({"a": 1, "b": {"c": 2, "x": "y"}, "list": [1, 2]});
        let modified = json!({"b": {"c": 3, "x": "y"}, "list": [3], "new": true});

        let patch = merge_patch(&original, &modified);
        let mut target = original.clone();
        apply_merge_patch(&mut target, &patch);
        assert_eq!(target, modified);
    }
}
