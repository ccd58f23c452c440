//! Canonical CBOR encoding for deterministic serialization.
//!
//! Implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! Leaf payloads and identity blocks go through this encoder before they
//! are hashed, so the same logical value produces identical bytes (and an
//! identical tree hash) on every platform.

use ciborium::value::Value;

use crate::error::CoreError;

/// Encode a CBOR value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Decode a CBOR value from bytes.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CoreError> {
    let cursor = std::io::Cursor::new(bytes);
    ciborium::from_reader(cursor).map_err(|e| CoreError::DecodingError(e.to_string()))
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            encode_integer(buf, *i);
        }
        Value::Bytes(b) => {
            encode_bytes(buf, b);
        }
        Value::Text(s) => {
            encode_text(buf, s);
        }
        Value::Array(arr) => {
            encode_array(buf, arr);
        }
        Value::Map(entries) => {
            encode_map_canonical(buf, entries);
        }
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
        }
        Value::Null => {
            buf.push(0xf6);
        }
        Value::Float(_) => {
            panic!("floats not supported in canonical encoding");
        }
        _ => {
            panic!("unsupported CBOR value type");
        }
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Read an unsigned integer field out of a decoded CBOR map.
pub fn map_get_u64(entries: &[(Value, Value)], key: u64) -> Result<u64, CoreError> {
    match map_get(entries, key)? {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            u64::try_from(n).map_err(|_| CoreError::DecodingError(format!("field {key} negative")))
        }
        _ => Err(CoreError::DecodingError(format!("field {key} not an integer"))),
    }
}

/// Read a byte-string field out of a decoded CBOR map.
pub fn map_get_bytes(entries: &[(Value, Value)], key: u64) -> Result<&[u8], CoreError> {
    match map_get(entries, key)? {
        Value::Bytes(b) => Ok(b),
        _ => Err(CoreError::DecodingError(format!("field {key} not bytes"))),
    }
}

/// Read a text field out of a decoded CBOR map.
pub fn map_get_text<'a>(entries: &'a [(Value, Value)], key: u64) -> Result<&'a str, CoreError> {
    match map_get(entries, key)? {
        Value::Text(s) => Ok(s),
        _ => Err(CoreError::DecodingError(format!("field {key} not text"))),
    }
}

/// Read an array field out of a decoded CBOR map.
pub fn map_get_array(entries: &[(Value, Value)], key: u64) -> Result<&[Value], CoreError> {
    match map_get(entries, key)? {
        Value::Array(a) => Ok(a),
        _ => Err(CoreError::DecodingError(format!("field {key} not an array"))),
    }
}

fn map_get(entries: &[(Value, Value)], key: u64) -> Result<&Value, CoreError> {
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == i128::from(key)))
        .map(|(_, v)| v)
        .ok_or_else(|| CoreError::DecodingError(format!("missing field {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keys_sorted_by_encoding() {
        // Entries given out of order must encode identically to in-order.
        let a = Value::Map(vec![
            (Value::Integer(1.into()), Value::Text("b".into())),
            (Value::Integer(0.into()), Value::Text("a".into())),
        ]);
        let b = Value::Map(vec![
            (Value::Integer(0.into()), Value::Text("a".into())),
            (Value::Integer(1.into()), Value::Text("b".into())),
        ]);
        assert_eq!(encode_canonical(&a), encode_canonical(&b));
    }

    #[test]
    fn test_smallest_integer_encoding() {
        let v = Value::Integer(23.into());
        assert_eq!(encode_canonical(&v), vec![23]);
        let v = Value::Integer(24.into());
        assert_eq!(encode_canonical(&v), vec![0x18, 24]);
    }

    #[test]
    fn test_roundtrip_through_ciborium() {
        let v = Value::Map(vec![
            (Value::Integer(0.into()), Value::Bytes(vec![1, 2, 3])),
            (Value::Integer(1.into()), Value::Integer(42.into())),
        ]);
        let bytes = encode_canonical(&v);
        let decoded = decode_value(&bytes).unwrap();
        let Value::Map(entries) = decoded else {
            panic!("expected map");
        };
        assert_eq!(map_get_u64(&entries, 1).unwrap(), 42);
        assert_eq!(map_get_bytes(&entries, 0).unwrap(), &[1, 2, 3]);
    }
}
