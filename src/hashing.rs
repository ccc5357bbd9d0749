//! Deterministic content hashing for the regenerator's group cache keys
//! (§4.5, §9: "a group's cached mesh is keyed by a hash of everything that
//! could change its output, not by its handle alone").
//!
//! Generalized from the teacher's `hash_intent`/`canonicalize_value`
//! (blake3 over a canonicalized `serde_json::Value` with sorted object
//! keys), kept verbatim where it still applies -- the canonicalization
//! trick matters just as much here, since two regenerations that produce
//! the same requests/constraints in a different insertion order must
//! still hash identically.

use serde::Serialize;
use serde_json::Value;

/// Hashes any serializable snapshot of a group's inputs (its requests,
/// constraint definitions, and upstream param values) into a stable key.
pub fn hash_group_inputs<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    hash_json_str(&json)
}

fn hash_json_str(json: &str) -> String {
    let normalized = normalize_json(json);
    let hash = blake3::hash(normalized.as_bytes());
    format!("group_{}", hash.to_hex())
}

fn canonicalize_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter_mut().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (_, v) in entries {
                canonicalize_value(v);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                canonicalize_value(v);
            }
        }
        _ => {}
    }
}

fn normalize_json(json: &str) -> String {
    if let Ok(mut parsed) = serde_json::from_str::<Value>(json) {
        canonicalize_value(&mut parsed);
        serde_json::to_string(&parsed).unwrap_or_else(|_| json.to_string())
    } else {
        json.split_whitespace().collect()
    }
}
