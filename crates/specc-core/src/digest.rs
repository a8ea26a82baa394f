use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn digest_str(s: &str) -> String {
    sha256_hex(s.as_bytes())
}

/// Digest of `parts` joined with `|`.
pub fn digest_parts(parts: &[&str]) -> String {
    digest_str(&parts.join("|"))
}

/// First 12 hex chars, for display only. Never used as identity.
pub fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Rebuild a value with every map's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact JSON with sorted keys.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&canonicalize(&v))?)
}

pub fn canonical_string(value: &Value) -> String {
    // Serializing a Value cannot fail: all keys are strings.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Hash of the canonical JSON form of any serializable artifact.
pub fn hash_artifact<T: Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(&canonical_json(value)?))
}
