// File: ledgerseal-meta/src/lib.rs
//! Canonical encoding and digesting of object metadata.
//!
//! Metadata is encoded as compact JSON with object keys in lexicographic byte
//! order at every nesting level. Two mappings holding the same entries encode
//! to the same bytes no matter how a collaborator ordered them, which is what
//! makes an anchored digest comparable with one recomputed later.
use ledgerseal_hash::{sha256, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Metadata = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata value at `{key}` is a non-finite float and has no canonical encoding")]
    NonFiniteFloat { key: String },
    #[error("metadata encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A single metadata value as reported by an object store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<u64> for Value { fn from(v: u64) -> Self { Value::UInt(v) } }
impl From<u32> for Value { fn from(v: u32) -> Self { Value::UInt(v as u64) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::Text(v.to_string()) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Text(v) } }

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => Value::Map(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

/// Canonical byte encoding of a metadata mapping.
pub fn canonical_bytes(meta: &Metadata) -> Result<Vec<u8>, MetadataError> {
    let mut out = Vec::with_capacity(32 * meta.len() + 2);
    write_map(meta, "", &mut out)?;
    Ok(out)
}

/// `sha256(canonical_bytes(meta))`.
pub fn metadata_digest(meta: &Metadata) -> Result<Digest, MetadataError> {
    Ok(sha256(&canonical_bytes(meta)?))
}

fn write_map(map: &BTreeMap<String, Value>, path: &str, out: &mut Vec<u8>) -> Result<(), MetadataError> {
    out.push(b'{');
    // BTreeMap<String, _> iterates in byte-lexicographic key order
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 { out.push(b','); }
        serde_json::to_writer(&mut *out, k)?;
        out.push(b':');
        let child = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
        write_value(v, &child, out)?;
    }
    out.push(b'}');
    Ok(())
}

fn write_value(v: &Value, path: &str, out: &mut Vec<u8>) -> Result<(), MetadataError> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Value::UInt(u) => out.extend_from_slice(u.to_string().as_bytes()),
        Value::Float(f) => {
            let n = serde_json::Number::from_f64(*f)
                .ok_or_else(|| MetadataError::NonFiniteFloat { key: path.to_string() })?;
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::Text(s) => serde_json::to_writer(&mut *out, s)?,
        Value::List(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 { out.push(b','); }
                write_value(item, &format!("{path}[{i}]"), out)?;
            }
            out.push(b']');
        }
        Value::Map(m) => write_map(m, path, out)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn keys_sorted_compact() {
        let m = meta(&[
            ("type", "FILE".into()),
            ("length", Value::UInt(20)),
            ("owner", "kiran".into()),
            ("acl", Value::Map(meta(&[("z", Value::Null), ("a", true.into())]))),
        ]);
        let bytes = canonical_bytes(&m).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"acl":{"a":true,"z":null},"length":20,"owner":"kiran","type":"FILE"}"#
        );
    }

    #[test]
    fn strings_are_json_escaped() {
        let m = meta(&[("path", "a\"b\\c\n".into()), ("list", Value::List(vec![1i64.into(), 2.5f64.into()]))]);
        let bytes = canonical_bytes(&m).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"list":[1,2.5],"path":"a\"b\\c\n"}"#);
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["path"], "a\"b\\c\n");
    }

    #[test]
    fn non_finite_float_rejected_with_path() {
        let nested = Value::Map(meta(&[("ratio", Value::List(vec![Value::Float(f64::INFINITY)]))]));
        let m = meta(&[("stats", nested)]);
        match metadata_digest(&m) {
            Err(MetadataError::NonFiniteFloat { key }) => assert_eq!(key, "stats.ratio[0]"),
            other => panic!("expected NonFiniteFloat, got {other:?}"),
        }
        assert!(metadata_digest(&meta(&[("x", Value::Float(f64::NAN))])).is_err());
    }

    #[test]
    fn digest_tracks_any_value_change() {
        let a = meta(&[("length", Value::UInt(20)), ("modificationTime", Value::UInt(1))]);
        let b = meta(&[("length", Value::UInt(20)), ("modificationTime", Value::UInt(2))]);
        assert_ne!(metadata_digest(&a).unwrap(), metadata_digest(&b).unwrap());
        assert_eq!(metadata_digest(&a).unwrap(), sha256(&canonical_bytes(&a).unwrap()));
    }

    #[test]
    fn from_json_object() {
        let j = serde_json::json!({"length": 26, "blockSize": 134217728u64, "owner": "kiran", "neg": -1});
        let m: Metadata = match Value::from(j) {
            Value::Map(m) => m,
            other => panic!("expected map, got {other:?}"),
        };
        assert_eq!(m["length"], Value::Int(26));
        assert_eq!(m["neg"], Value::Int(-1));
        assert_eq!(
            std::str::from_utf8(&canonical_bytes(&m).unwrap()).unwrap(),
            r#"{"blockSize":134217728,"length":26,"neg":-1,"owner":"kiran"}"#
        );
    }

    proptest! {
        #[test]
        fn insertion_order_is_irrelevant(entries in proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..16)) {
            let forward: Metadata = entries.iter().map(|(k, v)| (k.clone(), Value::Int(*v))).collect();
            let mut reversed = Metadata::new();
            for (k, v) in forward.iter().rev() {
                reversed.insert(k.clone(), v.clone());
            }
            prop_assert_eq!(metadata_digest(&forward).unwrap(), metadata_digest(&reversed).unwrap());
        }
    }
}
