//! Validate request props before they enter the sandbox.
//!
//! Props must be a JSON object. Keys like `__proto__`, `constructor` and
//! `prototype` are rejected at any depth so they cannot reach object
//! prototypes when the props are materialized in V8.

use crate::error::PipelineError;
use serde_json::{Map, Value};

/// Maximum recursion depth for nested objects/arrays
const MAX_DEPTH: usize = 32;

/// Keys that could be used for prototype pollution
const DANGEROUS_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Turn optional request props into a validated object.
///
/// `None` and `null` become an empty object.
pub fn sanitize_props(props: Option<Value>) -> Result<Map<String, Value>, PipelineError> {
    match props {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => {
            check_object(&map, 0)?;
            Ok(map)
        }
        Some(other) => Err(PipelineError::validation(format!(
            "props must be an object, got {}",
            kind(&other)
        ))),
    }
}

fn check_object(map: &Map<String, Value>, depth: usize) -> Result<(), PipelineError> {
    if let Some(key) = map
        .keys()
        .find(|key| DANGEROUS_KEYS.contains(&key.as_str()))
    {
        return Err(PipelineError::validation(format!(
            "'{}' key is forbidden in props",
            key
        )));
    }
    map.values().try_for_each(|value| check_value(value, depth + 1))
}

fn check_value(value: &Value, depth: usize) -> Result<(), PipelineError> {
    if depth > MAX_DEPTH {
        return Err(PipelineError::validation(format!(
            "props nesting too deep (max {} levels)",
            MAX_DEPTH
        )));
    }

    match value {
        Value::Object(map) => check_object(map, depth),
        Value::Array(items) => items.iter().try_for_each(|item| check_value(item, depth + 1)),
        _ => Ok(()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_props() {
        let props = json!({
            "page": "home",
            "user": {
                "name": "Alice",
                "settings": {
                    "theme": "dark"
                }
            },
            "items": [1, 2, {"nested": true}]
        });

        let result = sanitize_props(Some(props.clone())).unwrap();
        assert_eq!(Value::Object(result), props);
    }

    #[test]
    fn test_missing_and_null_props_are_empty() {
        assert!(sanitize_props(None).unwrap().is_empty());
        assert!(sanitize_props(Some(Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_object_props() {
        let error = sanitize_props(Some(json!([1, 2]))).unwrap_err();
        assert_eq!(
            error,
            PipelineError::validation("props must be an object, got an array")
        );
    }

    #[test]
    fn test_blocks_proto() {
        let result = sanitize_props(Some(json!({ "__proto__": { "polluted": true } })));
        assert!(result.unwrap_err().to_string().contains("__proto__"));
    }

    #[test]
    fn test_blocks_constructor() {
        let result = sanitize_props(Some(json!({ "constructor": { "prototype": {} } })));
        assert!(result.unwrap_err().to_string().contains("constructor"));
    }

    #[test]
    fn test_blocks_nested_proto() {
        let props = json!({
            "safe": {
                "nested": {
                    "__proto__": {"polluted": true}
                }
            }
        });

        assert!(sanitize_props(Some(props)).is_err());
    }

    #[test]
    fn test_blocks_proto_in_array() {
        let props = json!({
            "items": [
                {"safe": true},
                {"__proto__": {"polluted": true}}
            ]
        });

        assert!(sanitize_props(Some(props)).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!({"leaf": true});
        for _ in 0..35 {
            value = json!({"nested": value});
        }

        let result = sanitize_props(Some(value));
        assert!(result.unwrap_err().to_string().contains("too deep"));
    }
}
