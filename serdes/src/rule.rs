//! Serialization rules.
//!
//! A [`SerDesRule`] binds the path codec to leaf codecs and converts whole
//! documents to and from [`BufferMap`]s, the unit exchanged with storage.
//!
//! Two layouts exist:
//!
//! - **Single file**: the whole document is one leaf stored at the root path.
//! - **Parts**: the document is flattened and every leaf becomes one part,
//!   encoded with the data type configured for its path.

use crate::{
    codec::{DataType, LeafCodec},
    error::Result,
    path::{FlatMap, PathConfig},
    PartPath, RuleId, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage representation: part path to raw bytes.
pub type BufferMap = BTreeMap<PartPath, Vec<u8>>;

/// Bytes an empty array is stored as in the parts layout.
pub const EMPTY_ARRAY_BYTES: &[u8] = b"[]";
/// Bytes an empty mapping is stored as in the parts layout.
pub const EMPTY_OBJECT_BYTES: &[u8] = b"{}";

/// How a rule lays a document out in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    SingleFile,
    Parts,
}

/// Per-part options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartOptions {
    /// Data type of the part's bytes
    pub data_type: DataType,
}

/// Options supplied by the caller at (de)serialization time.
///
/// Typically derived from a schema the extension author configures:
///
/// ```json
/// { "parts": { "/count": { "dataType": "number" } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerDesOptions {
    /// Options by part path
    pub parts: BTreeMap<PartPath, PartOptions>,
}

impl SerDesOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to declare the data type of a part.
    pub fn with_part(mut self, path: impl Into<PartPath>, data_type: DataType) -> Self {
        self.parts.insert(path.into(), PartOptions { data_type });
        self
    }

    /// Data type declared for a part, matching keys in any rendering.
    pub fn data_type_for(&self, paths: &PathConfig, path: &str) -> Option<DataType> {
        if let Some(part) = self.parts.get(path) {
            return Some(part.data_type);
        }
        let normalized = paths.normalize(path);
        self.parts
            .iter()
            .find(|(key, _)| paths.normalize(key) == normalized)
            .map(|(_, part)| part.data_type)
    }
}

/// A serialize/deserialize pair for one storage convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerDesRule {
    /// Rule identifier
    pub id: RuleId,
    /// Storage layout
    pub layout: Layout,
    /// Data type of parts without explicit options
    pub default_type: DataType,
    /// Path conventions used for part paths
    pub paths: PathConfig,
}

impl SerDesRule {
    /// A rule storing the whole document as one part.
    pub fn single_file(id: impl Into<RuleId>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            layout: Layout::SingleFile,
            default_type: data_type,
            paths: PathConfig::default(),
        }
    }

    /// A rule storing every leaf as its own part.
    pub fn parts(id: impl Into<RuleId>, default_type: DataType) -> Self {
        Self {
            id: id.into(),
            layout: Layout::Parts,
            default_type,
            paths: PathConfig::default(),
        }
    }

    /// Builder-style method to change the path conventions.
    pub fn with_paths(mut self, paths: PathConfig) -> Self {
        self.paths = paths;
        self
    }

    /// Leaf codec for a part, from the options or the rule default.
    pub fn codec_for(&self, path: &str, opts: &SerDesOptions) -> LeafCodec {
        let data_type = opts
            .data_type_for(&self.paths, path)
            .unwrap_or(self.default_type);
        LeafCodec::for_type(data_type)
    }

    /// Serialize a document into storage parts.
    ///
    /// The same document and options always produce the same buffers.
    pub fn serialize(&self, doc: &Value, opts: &SerDesOptions) -> Result<BufferMap> {
        let mut buffers = BufferMap::new();

        match self.layout {
            Layout::SingleFile => {
                if doc.is_undefined() {
                    return Ok(buffers);
                }
                let root = self.paths.root_path();
                let bytes = self.codec_for(&root, opts).encode(&root, doc)?;
                buffers.insert(root, bytes);
            }
            Layout::Parts => {
                for (path, value) in self.paths.flatten(doc)? {
                    let bytes = match value {
                        Value::Array(ref items) if items.is_empty() => EMPTY_ARRAY_BYTES.to_vec(),
                        Value::Object(ref map) if map.is_empty() => EMPTY_OBJECT_BYTES.to_vec(),
                        _ => self.codec_for(&path, opts).encode(&path, &value)?,
                    };
                    tracing::trace!(rule = %self.id, path = %path, len = bytes.len(), "Encoded part");
                    buffers.insert(path, bytes);
                }
            }
        }

        Ok(buffers)
    }

    /// Deserialize storage parts into a document.
    ///
    /// Fails on the first part that does not decode; no partial document is
    /// returned. A single-file rule with no root part yields `Undefined`.
    pub fn deserialize(&self, buffers: &BufferMap, opts: &SerDesOptions) -> Result<Value> {
        match self.layout {
            Layout::SingleFile => {
                let root = self.paths.root_path();
                let entry = buffers
                    .iter()
                    .find(|(path, _)| self.paths.normalize(path) == root);

                for path in buffers.keys().filter(|path| self.paths.normalize(path) != root) {
                    tracing::warn!(rule = %self.id, path = %path, "Ignoring non-root part for single-file rule");
                }

                let Some((_, bytes)) = entry else {
                    return Ok(Value::Undefined);
                };

                let codec = self.codec_for(&root, opts);
                let value = codec.decode(&root, bytes)?;
                Ok(match (codec, value) {
                    (LeafCodec::Binary, Value::Bytes(raw)) => Value::binary_pair(raw),
                    (_, value) => value,
                })
            }
            Layout::Parts => {
                let mut flat = FlatMap::new();
                for (path, bytes) in buffers {
                    let path = self.paths.normalize(path);
                    let value = match bytes.as_slice() {
                        EMPTY_ARRAY_BYTES => Value::array(),
                        EMPTY_OBJECT_BYTES => Value::object(),
                        raw => self.codec_for(&path, opts).decode(&path, raw)?,
                    };
                    tracing::trace!(rule = %self.id, path = %path, "Decoded part");
                    flat.insert(path, value);
                }
                self.paths.unflatten(&flat)
            }
        }
    }
}

/// Rules available by identifier without registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinRule {
    /// Parts, text leaves
    Text,
    /// Parts, JSON leaves
    Json,
    /// Parts, YAML leaves
    Yaml,
    /// Parts, binary leaves
    Binary,
    /// Parts, numeric leaves
    Number,
    /// Whole document as one JSON file
    JsonFile,
    /// Whole document as one YAML file
    YamlFile,
    /// Whole document as one text file
    TextFile,
    /// Whole document as one binary file
    BinaryFile,
}

impl BuiltinRule {
    pub const ALL: [BuiltinRule; 9] = [
        BuiltinRule::Text,
        BuiltinRule::Json,
        BuiltinRule::Yaml,
        BuiltinRule::Binary,
        BuiltinRule::Number,
        BuiltinRule::JsonFile,
        BuiltinRule::YamlFile,
        BuiltinRule::TextFile,
        BuiltinRule::BinaryFile,
    ];

    /// Identifier the rule is looked up by.
    pub fn id(&self) -> &'static str {
        match self {
            BuiltinRule::Text => "text",
            BuiltinRule::Json => "json",
            BuiltinRule::Yaml => "yaml",
            BuiltinRule::Binary => "binary",
            BuiltinRule::Number => "number",
            BuiltinRule::JsonFile => "json-file",
            BuiltinRule::YamlFile => "yaml-file",
            BuiltinRule::TextFile => "text-file",
            BuiltinRule::BinaryFile => "binary-file",
        }
    }

    /// Look a rule up by identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.id() == id)
    }

    /// Build the rule.
    pub fn rule(&self) -> SerDesRule {
        let id = self.id();
        match self {
            BuiltinRule::Text => SerDesRule::parts(id, DataType::Text),
            BuiltinRule::Json => SerDesRule::parts(id, DataType::Json),
            BuiltinRule::Yaml => SerDesRule::parts(id, DataType::Yaml),
            BuiltinRule::Binary => SerDesRule::parts(id, DataType::Binary),
            BuiltinRule::Number => SerDesRule::parts(id, DataType::Number),
            BuiltinRule::JsonFile => SerDesRule::single_file(id, DataType::Json),
            BuiltinRule::YamlFile => SerDesRule::single_file(id, DataType::Yaml),
            BuiltinRule::TextFile => SerDesRule::single_file(id, DataType::Text),
            BuiltinRule::BinaryFile => SerDesRule::single_file(id, DataType::Binary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    #[test]
    fn json_file_end_to_end() {
        let rule = BuiltinRule::JsonFile.rule();
        let d = doc(json!({"title": "Hello world", "count": 3}));

        let buffers = rule.serialize(&d, &SerDesOptions::new()).unwrap();
        assert_eq!(buffers.len(), 1);
        let bytes = &buffers["/"];
        let text = std::str::from_utf8(bytes).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"title": "Hello world", "count": 3}));

        assert_eq!(rule.deserialize(&buffers, &SerDesOptions::new()).unwrap(), d);
    }

    #[test]
    fn json_file_rejects_garbage() {
        let rule = BuiltinRule::JsonFile.rule();
        let mut buffers = BufferMap::new();
        buffers.insert("/".into(), b"<html>".to_vec());

        let result = rule.deserialize(&buffers, &SerDesOptions::new());
        assert!(matches!(
            result,
            Err(Error::Decode { path, data_type: DataType::Json, .. }) if path == "/"
        ));
    }

    #[test]
    fn single_file_without_root_part() {
        let rule = BuiltinRule::YamlFile.rule();
        let value = rule.deserialize(&BufferMap::new(), &SerDesOptions::new()).unwrap();
        assert!(value.is_undefined());
        assert!(rule
            .serialize(&Value::Undefined, &SerDesOptions::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn binary_file_yields_pair() {
        let rule = BuiltinRule::BinaryFile.rule();
        let mut buffers = BufferMap::new();
        buffers.insert("/".into(), vec![1, 2, 3]);

        let value = rule.deserialize(&buffers, &SerDesOptions::new()).unwrap();
        assert_eq!(value, Value::binary_pair(vec![1, 2, 3]));

        let back = rule.serialize(&value, &SerDesOptions::new()).unwrap();
        assert_eq!(back, buffers);

        let bare = rule
            .serialize(&Value::Bytes(vec![1, 2, 3]), &SerDesOptions::new())
            .unwrap();
        assert_eq!(bare, buffers);
    }

    #[test]
    fn parts_text_by_default() {
        let rule = BuiltinRule::Text.rule();
        let d = doc(json!({"title": "Hello world", "foo": {"bar": "baz"}}));

        let buffers = rule.serialize(&d, &SerDesOptions::new()).unwrap();
        assert_eq!(buffers["/title"], b"Hello world".to_vec());
        assert_eq!(buffers["/foo/bar"], b"baz".to_vec());
        assert_eq!(rule.deserialize(&buffers, &SerDesOptions::new()).unwrap(), d);
    }

    #[test]
    fn parts_with_numeric_option() {
        let rule = BuiltinRule::Text.rule();
        let opts = SerDesOptions::new().with_part("/count", DataType::Number);
        let d = doc(json!({"title": "Widget", "count": 42}));

        let buffers = rule.serialize(&d, &opts).unwrap();
        assert_eq!(buffers["/count"], b"42".to_vec());
        assert_eq!(rule.deserialize(&buffers, &opts).unwrap(), d);

        // Without the option the count comes back as text.
        let as_text = rule.deserialize(&buffers, &SerDesOptions::new()).unwrap();
        assert_eq!(as_text, doc(json!({"title": "Widget", "count": "42"})));
    }

    #[test]
    fn parts_preserve_empty_containers() {
        let rule = BuiltinRule::Json.rule();
        let d = doc(json!({"a": [], "b": {}, "c": [1, 2]}));

        let buffers = rule.serialize(&d, &SerDesOptions::new()).unwrap();
        assert_eq!(buffers["/a"], EMPTY_ARRAY_BYTES.to_vec());
        assert_eq!(buffers["/b"], EMPTY_OBJECT_BYTES.to_vec());
        assert_eq!(rule.deserialize(&buffers, &SerDesOptions::new()).unwrap(), d);
    }

    #[test]
    fn text_leaf_spelled_like_marker_is_lossy() {
        let rule = BuiltinRule::Text.rule();
        let d = doc(json!({"note": "[]"}));

        let buffers = rule.serialize(&d, &SerDesOptions::new()).unwrap();
        let restored = rule.deserialize(&buffers, &SerDesOptions::new()).unwrap();
        assert_eq!(restored, doc(json!({"note": []})));
    }

    #[test]
    fn parts_decode_failure_names_part() {
        let rule = BuiltinRule::Text.rule();
        let opts = SerDesOptions::new().with_part("count", DataType::Number);
        let mut buffers = BufferMap::new();
        buffers.insert("/title".into(), b"ok".to_vec());
        buffers.insert("count".into(), b"many".to_vec());

        let result = rule.deserialize(&buffers, &opts);
        assert!(matches!(
            result,
            Err(Error::Decode { path, data_type: DataType::Number, .. }) if path == "/count"
        ));
    }

    #[test]
    fn unknown_data_type_decodes_as_text() {
        let opts: SerDesOptions =
            serde_json::from_str(r#"{"parts": {"/body": {"dataType": "markdown"}}}"#).unwrap();
        let rule = BuiltinRule::Json.rule();
        let mut buffers = BufferMap::new();
        buffers.insert("/body".into(), b"# Heading".to_vec());

        let value = rule.deserialize(&buffers, &opts).unwrap();
        assert_eq!(value, doc(json!({"body": "# Heading"})));
    }

    #[test]
    fn serialization_is_deterministic() {
        let rule = BuiltinRule::Yaml.rule();
        let d = doc(json!({"z": 1, "a": {"y": [true, null], "b": "x"}}));

        let first = rule.serialize(&d, &SerDesOptions::new()).unwrap();
        let second = rule.serialize(&d.clone(), &SerDesOptions::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn dotted_parts_rule() {
        let rule = SerDesRule::parts("dotted", DataType::Text).with_paths(PathConfig::dotted());
        let d = doc(json!({"foo": {"bar": "baz"}}));

        let buffers = rule.serialize(&d, &SerDesOptions::new()).unwrap();
        assert!(buffers.contains_key("foo.bar"));
        assert_eq!(rule.deserialize(&buffers, &SerDesOptions::new()).unwrap(), d);
    }

    #[test]
    fn builtin_lookup() {
        for builtin in BuiltinRule::ALL {
            assert_eq!(BuiltinRule::from_id(builtin.id()), Some(builtin));
            assert_eq!(builtin.rule().id, builtin.id());
        }
        assert_eq!(BuiltinRule::from_id("xml"), None);
    }

    #[test]
    fn options_from_json() {
        let opts: SerDesOptions =
            serde_json::from_str(r#"{"parts": {"/n": {"dataType": "number"}}}"#).unwrap();
        assert_eq!(opts, SerDesOptions::new().with_part("/n", DataType::Number));

        let empty: SerDesOptions = serde_json::from_str("{}").unwrap();
        assert!(empty.parts.is_empty());
    }
}
