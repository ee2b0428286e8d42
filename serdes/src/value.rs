//! The logical document model.
//!
//! A [`Value`] is the assembled form an extension works with: nested
//! sequences and mappings over scalar leaves. It mirrors `serde_json::Value`
//! with two additions the storage layer needs: raw byte blobs and an
//! explicit `Undefined` marker for absent leaves.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Key of the raw bytes in a binary pair object.
pub const BINARY_DATA_KEY: &str = "binaryData";
/// Key of the base64 rendering in a binary pair object.
pub const BINARY_BASE64_KEY: &str = "asBase64";

/// A node of a logical document.
///
/// Mappings use `BTreeMap` so every traversal is deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent leaf. Dropped by `flatten`, so it never survives a round trip.
    Undefined,
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// An empty mapping.
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// An empty sequence.
    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    /// Build the `{ binaryData, asBase64 }` pair handed out by binary file rules.
    pub fn binary_pair(bytes: Vec<u8>) -> Self {
        let encoded = B64.encode(&bytes);
        let mut map = BTreeMap::new();
        map.insert(BINARY_DATA_KEY.to_string(), Value::Bytes(bytes));
        map.insert(BINARY_BASE64_KEY.to_string(), Value::String(encoded));
        Value::Object(map)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// True for `[]` and `{}`, the markers `flatten` emits for empty containers.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of a blob, either a bare `Bytes` leaf or a binary pair object.
    ///
    /// A pair carrying only `asBase64` is decoded; `None` if that fails.
    pub fn as_binary(&self) -> Option<std::borrow::Cow<'_, [u8]>> {
        match self {
            Value::Bytes(bytes) => Some(std::borrow::Cow::Borrowed(bytes)),
            Value::Object(map) => match (map.get(BINARY_DATA_KEY), map.get(BINARY_BASE64_KEY)) {
                (Some(Value::Bytes(bytes)), _) => Some(std::borrow::Cow::Borrowed(bytes)),
                (None, Some(Value::String(encoded))) => {
                    B64.decode(encoded).ok().map(std::borrow::Cow::Owned)
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Index into a mapping by key or a sequence by position.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Render as JSON.
    ///
    /// Bytes become base64 strings. `Undefined` is dropped from mappings and
    /// becomes `null` elsewhere, the way `JSON.stringify` treats it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(bytes) => serde_json::Value::String(B64.encode(bytes)),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON number form and become `Null`.
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
