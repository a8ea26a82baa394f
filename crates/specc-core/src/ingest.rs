//! Normalizes YAML or JSON text into the canonical nested tree the AST
//! builder reads.

use crate::error::{Result, SpeccError};
use serde_json::{Map, Number, Value};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// By extension; anything other than `.json` is read as YAML, which is
    /// a superset of JSON.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

pub fn normalize(text: &str, format: Format) -> Result<Value> {
    match format {
        Format::Json => Ok(serde_json::from_str(text)?),
        Format::Yaml => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
            yaml_to_json(yaml)
        }
    }
}

fn scalar_key(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok("null".to_string()),
        other => Err(SpeccError::Ingest(format!(
            "map keys must be scalars, found {other:?}"
        ))),
    }
}

/// YAML allows non-string keys, tags and non-finite floats; the canonical
/// tree does not.
pub fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Value::Number(Number::from_f64(f).ok_or_else(|| {
                    SpeccError::Ingest(format!("number {n} has no JSON form"))
                })?)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_yaml::Value::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = scalar_key(k)?;
                if out.contains_key(&key) {
                    return Err(SpeccError::Ingest(format!("duplicate key '{key}'")));
                }
                out.insert(key, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_and_json_normalize_identically() {
        let yaml = "metadata:\n  name: pay\n  version: 1\nsections:\n  - id: a\n";
        let json_text = r#"{"sections": [{"id": "a"}], "metadata": {"version": 1, "name": "pay"}}"#;
        assert_eq!(
            normalize(yaml, Format::Yaml).unwrap(),
            normalize(json_text, Format::Json).unwrap()
        );
    }

    #[test]
    fn scalar_keys_become_strings() {
        let v = normalize("1: one\ntrue: yes\n", Format::Yaml).unwrap();
        assert_eq!(v, json!({"1": "one", "true": "yes"}));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(matches!(
            normalize("x: .nan\n", Format::Yaml),
            Err(SpeccError::Ingest(_))
        ));
    }

    #[test]
    fn format_by_extension() {
        assert_eq!(Format::for_path(Path::new("spec.JSON")), Format::Json);
        assert_eq!(Format::for_path(Path::new("spec.yml")), Format::Yaml);
        assert_eq!(Format::for_path(Path::new("spec")), Format::Yaml);
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(normalize("{not json", Format::Json).is_err());
        assert!(normalize("a: [1, 2", Format::Yaml).is_err());
    }
}
