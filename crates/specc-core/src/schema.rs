//! Structural validation against a small JSON-schema subset: `type`,
//! `required`, `properties`, `additionalProperties` (boolean), `items`,
//! `minItems`, `minLength` and `enum`.

use crate::ast::join_pointer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub pointer: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.pointer.is_empty() { "/" } else { &self.pointer };
        write!(f, "{at}: {}", self.message)
    }
}

/// Shape checks for the recognised top-level keys. Field-level strictness
/// (required names, ids) is left to semantic validation so it degrades
/// rather than refuses.
pub fn default_schema() -> Value {
    let list_of_maps = json!({"type": "array", "items": {"type": "object"}});
    json!({
        "type": "object",
        "properties": {
            "metadata": {"type": "object"},
            "instructions": {"type": ["string", "array"]},
            "sections": list_of_maps.clone(),
            "architecture": {
                "type": "object",
                "properties": {"modules": list_of_maps.clone()}
            },
            "agents": list_of_maps.clone(),
            "api": {
                "type": "object",
                "properties": {"endpoints": list_of_maps.clone()}
            },
            "invariants": {
                "type": "array",
                "items": {"type": "object", "properties": {"expr": {"type": "string"}}}
            },
            "requirements": list_of_maps.clone(),
            "flows": {
                "type": "array",
                "items": {"type": "object", "properties": {"steps": {"type": "array"}}}
            },
            "bootstrap": list_of_maps
        }
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    let actual = type_name(value);
    actual == expected || (expected == "number" && actual == "integer")
}

pub fn validate(doc: &Value, schema: &Value) -> Vec<SchemaViolation> {
    let mut out = Vec::new();
    check(doc, schema, "", &mut out);
    out
}

fn check(value: &Value, schema: &Value, pointer: &str, out: &mut Vec<SchemaViolation>) {
    let Some(schema) = schema.as_object() else {
        return;
    };
    let mut fail = |message: String| {
        out.push(SchemaViolation {
            pointer: pointer.to_string(),
            message,
        })
    };

    if let Some(t) = schema.get("type") {
        let allowed: Vec<&str> = match t {
            Value::String(s) => vec![s.as_str()],
            Value::Array(list) => list.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(value, t)) {
            fail(format!(
                "expected {}, found {}",
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            fail(format!("{value} is not one of the allowed values"));
        }
    }

    if let (Some(min), Some(s)) = (schema.get("minLength").and_then(Value::as_u64), value.as_str()) {
        if (s.chars().count() as u64) < min {
            fail(format!("string shorter than {min}"));
        }
    }

    if let Value::Array(items) = value {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                fail(format!("expected at least {min} item(s), found {}", items.len()));
            }
        }
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                check(item, item_schema, &join_pointer(pointer, &i.to_string()), out);
            }
        }
    }

    if let Value::Object(map) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    out.push(SchemaViolation {
                        pointer: pointer.to_string(),
                        message: format!("missing required key '{key}'"),
                    });
                }
            }
        }
        let props = schema.get("properties").and_then(Value::as_object);
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        for key in keys {
            let child = join_pointer(pointer, key);
            match props.and_then(|p| p.get(key)) {
                Some(sub) => check(&map[key], sub, &child, out),
                None => {
                    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                        out.push(SchemaViolation {
                            pointer: child,
                            message: "unexpected key".to_string(),
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_accepts_typical_spec() {
        let doc = json!({
            "metadata": {"name": "pay", "version": "1"},
            "instructions": "build it",
            "sections": [{"id": "a", "title": "A", "content": "x"}],
            "architecture": {"modules": [{"name": "ledger"}]},
            "invariants": [{"id": "I1", "expr": "exists /metadata"}],
            "custom": 3
        });
        assert!(validate(&doc, &default_schema()).is_empty());
    }

    #[test]
    fn wrong_shapes_are_reported_with_pointers() {
        let doc = json!({
            "sections": {"not": "a list"},
            "architecture": {"modules": ["ledger"]}
        });
        let v = validate(&doc, &default_schema());
        let pointers: Vec<_> = v.iter().map(|v| v.pointer.as_str()).collect();
        assert_eq!(pointers, vec!["/architecture/modules/0", "/sections"]);
    }

    #[test]
    fn subset_keywords() {
        let schema = json!({
            "type": "object",
            "required": ["kind"],
            "additionalProperties": false,
            "properties": {
                "kind": {"enum": ["a", "b"]},
                "tags": {"type": "array", "minItems": 1, "items": {"type": "string", "minLength": 2}}
            }
        });
        let doc = json!({"kind": "c", "tags": ["x"], "extra": 1});
        let messages: Vec<String> = validate(&doc, &schema).iter().map(|v| v.to_string()).collect();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().any(|m| m.starts_with("/extra")));
        assert!(validate(&json!({"tags": []}), &schema).len() == 2);
    }

    #[test]
    fn integer_counts_as_number() {
        assert!(validate(&json!(3), &json!({"type": "number"})).is_empty());
        assert_eq!(validate(&json!(3.5), &json!({"type": "integer"})).len(), 1);
    }
}
