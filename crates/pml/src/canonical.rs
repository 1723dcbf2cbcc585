// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Canonical JSON rendering and content hashing.
//!
//! Canonical form: object keys sorted recursively, compact separators. It is
//! the sole input to speculation-cache fingerprints and checkpoint content
//! hashes, so two values that differ only in key order or whitespace hash
//! identically.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild a value with recursively sorted object keys.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(fields.len());
            for key in keys {
                out.insert(key.clone(), canonicalize(&fields[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact, key-sorted JSON text.
pub fn canonical_json(value: &Value) -> String {
    // Serializing a Value cannot fail: keys are strings and numbers are finite.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Hex SHA-256 of the canonical JSON text.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}
