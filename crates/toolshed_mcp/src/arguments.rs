//! Tool argument normalization.
//!
//! `params.arguments` values arrive as raw JSON. They are converted once, at
//! the codec boundary, into a dynamic form that every downstream consumer
//! shares: the tool itself, the cache-key builder, and audit sanitization all
//! see the same [`ArgumentMap`]. Scalars map directly (numbers always become
//! f64); arrays and objects are carried as their verbatim JSON text.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved argument keys excluded from cache-key hashing.
pub const RESERVED_KEYS: &[&str] = &["action", "_meta"];

/// One normalized argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    /// Every JSON number widens to f64; tools needing integer semantics
    /// parse at their own boundary.
    Number(f64),
    Text(String),
    /// Verbatim JSON text of an array or object.
    Json(String),
}

impl ArgValue {
    /// String view, for Text values only.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view, for Number values only.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean view, for Bool values only.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert back to a JSON value (structured values are re-parsed).
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
        }
    }
}

/// Normalized argument map, ordered by key.
pub type ArgumentMap = BTreeMap<String, ArgValue>;

/// Normalize a raw `params.arguments` object into an [`ArgumentMap`].
pub fn normalize_arguments(arguments: &Map<String, Value>) -> ArgumentMap {
    arguments
        .iter()
        .map(|(k, v)| (k.clone(), normalize_value(v)))
        .collect()
}

fn normalize_value(value: &Value) -> ArgValue {
    match value {
        Value::Null => ArgValue::Null,
        Value::Bool(b) => ArgValue::Bool(*b),
        Value::Number(n) => ArgValue::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => ArgValue::Text(s.clone()),
        other => ArgValue::Json(other.to_string()),
    }
}

/// Extract the `action` argument, when present as a string.
pub fn action_of(arguments: &ArgumentMap) -> Option<String> {
    arguments.get("action").and_then(|v| v.as_str().map(String::from))
}

/// Canonical JSON of an argument map: keys sorted lexicographically, no
/// insignificant whitespace, object keys inside structured values sorted
/// recursively. Keys listed in `exclude` are omitted.
pub fn canonical_json(arguments: &ArgumentMap, exclude: &[&str]) -> String {
    let mut out = Map::new();
    for (key, value) in arguments {
        if exclude.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), canonicalize(&value.to_json()));
    }
    // serde_json's default object is a BTreeMap, so serialization emits
    // keys in sorted order with no extra whitespace.
    Value::Object(out).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_map(value: Value) -> ArgumentMap {
        normalize_arguments(value.as_object().unwrap())
    }

    #[test]
    fn test_scalars_normalize() {
        let args = to_map(json!({
            "s": "text",
            "i": 3,
            "f": 2.5,
            "b": true,
            "n": null
        }));

        assert_eq!(args["s"], ArgValue::Text("text".into()));
        assert_eq!(args["i"], ArgValue::Number(3.0));
        assert_eq!(args["f"], ArgValue::Number(2.5));
        assert_eq!(args["b"], ArgValue::Bool(true));
        assert_eq!(args["n"], ArgValue::Null);
    }

    #[test]
    fn test_structured_values_keep_verbatim_text() {
        let args = to_map(json!({ "list": [1, 2], "obj": { "a": 1 } }));

        assert_eq!(args["list"], ArgValue::Json("[1,2]".into()));
        assert_eq!(args["obj"], ArgValue::Json("{\"a\":1}".into()));
    }

    #[test]
    fn test_action_extraction() {
        let args = to_map(json!({ "action": "now", "x": 1 }));
        assert_eq!(action_of(&args).as_deref(), Some("now"));

        let no_action = to_map(json!({ "x": 1 }));
        assert_eq!(action_of(&no_action), None);

        // A non-string action is not an action.
        let numeric = to_map(json!({ "action": 7 }));
        assert_eq!(action_of(&numeric), None);
    }

    #[test]
    fn test_canonical_json_sorts_and_excludes() {
        let args = to_map(json!({ "zebra": 1, "action": "go", "alpha": "x" }));
        let canon = canonical_json(&args, RESERVED_KEYS);

        assert_eq!(canon, "{\"alpha\":\"x\",\"zebra\":1.0}");
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let args = to_map(json!({ "cfg": { "b": 1, "a": { "z": 2, "y": 3 } } }));
        let canon = canonical_json(&args, &[]);

        assert_eq!(canon, "{\"cfg\":{\"a\":{\"y\":3,\"z\":2},\"b\":1}}");
    }

    #[test]
    fn test_canonical_json_is_order_insensitive() {
        let a = to_map(json!({ "x": 1, "y": "v" }));
        let b = to_map(json!({ "y": "v", "x": 1 }));
        assert_eq!(canonical_json(&a, &[]), canonical_json(&b, &[]));
    }
}
