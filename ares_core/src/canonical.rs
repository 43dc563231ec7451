//! Canonical JSON serialization.
//!
//! The deterministic snapshot digest requires that the same logical state
//! always serializes to the same bytes: object keys in lexicographic order,
//! no insignificant whitespace, floats written through serde_json's shortest
//! round-trip form.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value canonically: objects keyed in lexicographic order,
/// compact separators.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            // serde_json's own formatting is already canonical for scalars.
            out.push_str(&value.to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_value(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// SHA-256 of the input, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Raw SHA-256 digest.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let v = json!({"zebra": 1, "apple": 2, "mango": {"b": 1, "a": 2}});
        assert_eq!(
            canonical_json(&v),
            r#"{"apple":2,"mango":{"a":2,"b":1},"zebra":1}"#
        );
    }

    #[test]
    fn arrays_preserve_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json(&v), "[3,1,2]");
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"k": "a\"b"});
        assert_eq!(canonical_json(&v), r#"{"k":"a\"b"}"#);
    }

    #[test]
    fn same_value_same_digest() {
        let a = json!({"x": 1, "y": [true, null]});
        let b = json!({"y": [true, null], "x": 1});
        assert_eq!(
            sha256_hex(canonical_json(&a).as_bytes()),
            sha256_hex(canonical_json(&b).as_bytes())
        );
    }
}
