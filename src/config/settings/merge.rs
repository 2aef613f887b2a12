// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::Value;

/// Deep-merge two JSON values.
/// `base` is existing file content, `overlay` is serialized current struct.
/// Overlay values take priority.
pub(super) fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = if let Some(base_val) = base_map.remove(&key) {
                    deep_merge(base_val, overlay_val)
                } else {
                    overlay_val
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_base, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_preserves_unknown_keys() {
        let base = json!({"tools": {"custom": true, "jitter": 0.5}, "extra": 1});
        let overlay = json!({"tools": {"jitter": 0.1}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged, json!({"tools": {"custom": true, "jitter": 0.1}, "extra": 1}));
    }

    #[test]
    fn test_deep_merge_overlay_replaces_scalars_and_arrays() {
        let base = json!({"aliases": ["a", "b"], "tools": 3});
        let overlay = json!({"aliases": ["c"], "tools": {"jitter": 0.0}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged, json!({"aliases": ["c"], "tools": {"jitter": 0.0}}));
    }
}
