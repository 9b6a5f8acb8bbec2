//! Text-key detection and shape-preserving substitution.
//!
//! Localization happens in two phases so any number of keys inside one
//! JSON value costs a single database query: walk the value collecting
//! every `TXT_KEY_*` string, resolve the batch, then walk again
//! substituting. Both walks preserve container shape and key order.

use std::collections::{BTreeSet, HashMap};

/// Whether a string is a localization key.
///
/// Strict form: `TXT_KEY_` followed by at least one of `A-Z`, `0-9`, `_`.
// TODO(openq): the game sometimes emits other all-caps tokens (e.g. bare
// CIVILIZATION_ROME) in event payloads; those are passed through
// untouched here.
pub fn is_text_key(s: &str) -> bool {
    match s.strip_prefix("TXT_KEY_") {
        Some(rest) => {
            !rest.is_empty()
                && rest
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        }
        None => false,
    }
}

/// Collect every localization key appearing anywhere in `value`.
///
/// Object keys are not localized — only string values are inspected.
pub fn collect_text_keys(value: &serde_json::Value, out: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::String(s) => {
            if is_text_key(s) {
                out.insert(s.clone());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_text_keys(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_text_keys(item, out);
            }
        }
        _ => {}
    }
}

/// Return a deep copy of `value` with every resolved key replaced by its
/// text. Keys absent from `resolved` stay as-is; non-key strings are
/// never rewritten.
pub fn substitute_text_keys(
    value: &serde_json::Value,
    resolved: &HashMap<String, String>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => match resolved.get(s.as_str()) {
            Some(text) => serde_json::Value::String(text.clone()),
            None => value.clone(),
        },
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| substitute_text_keys(item, resolved))
                .collect(),
        ),
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_text_keys(v, resolved));
            }
            serde_json::Value::Object(out)
        }
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_key_matching_is_strict() {
        assert!(is_text_key("TXT_KEY_TECH_AGRICULTURE"));
        assert!(is_text_key("TXT_KEY_BUILDING_BARRACKS_HELP_2"));
        assert!(!is_text_key("TXT_KEY_"));
        assert!(!is_text_key("TXT_KEY_lowercase"));
        assert!(!is_text_key("CIVILIZATION_ROME"));
        assert!(!is_text_key("TXT_KEY_HAS SPACE"));
        assert!(!is_text_key("prefix TXT_KEY_X"));
    }

    #[test]
    fn collect_walks_nested_containers() {
        let value = json!({
            "name": "TXT_KEY_UNIT_WARRIOR",
            "nested": {"help": "TXT_KEY_UNIT_WARRIOR_HELP", "cost": 40},
            "list": ["TXT_KEY_ERA_ANCIENT", "plain string"]
        });
        let mut keys = BTreeSet::new();
        collect_text_keys(&value, &mut keys);
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec![
                "TXT_KEY_ERA_ANCIENT",
                "TXT_KEY_UNIT_WARRIOR",
                "TXT_KEY_UNIT_WARRIOR_HELP"
            ]
        );
    }

    #[test]
    fn substitute_preserves_shape_and_key_order() {
        let value = json!({
            "zulu": "TXT_KEY_A",
            "alpha": 3,
            "mike": ["TXT_KEY_B", null, true]
        });
        let resolved = HashMap::from([
            ("TXT_KEY_A".to_string(), "Alpha text".to_string()),
            ("TXT_KEY_B".to_string(), "Bravo text".to_string()),
        ]);
        let out = substitute_text_keys(&value, &resolved);
        let obj = out.as_object().unwrap();
        let keys: Vec<&String> = obj.keys().collect();
        assert_eq!(keys, vec!["zulu", "alpha", "mike"]);
        assert_eq!(out["zulu"], "Alpha text");
        assert_eq!(out["mike"][0], "Bravo text");
        assert_eq!(out["mike"][1], json!(null));
        assert_eq!(out["alpha"], 3);
    }

    #[test]
    fn unresolved_keys_pass_through() {
        let value = json!({"k": "TXT_KEY_MISSING"});
        let out = substitute_text_keys(&value, &HashMap::new());
        assert_eq!(out["k"], "TXT_KEY_MISSING");
    }
}
