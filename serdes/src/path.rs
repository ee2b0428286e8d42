//! Path flattening.
//!
//! Converts between a nested [`Value`] and a [`FlatMap`] of separator-joined
//! part paths. Empty containers survive the trip as `[]` / `{}` markers, and
//! the array-or-mapping shape of non-empty containers is recovered from the
//! path segments themselves.
//!
//! ```rust
//! use paneron_serdes::{flatten, unflatten, Value};
//! use serde_json::json;
//!
//! let doc = Value::from(json!({"title": "Hello world", "foo": {"bar": "baz"}}));
//! let flat = flatten(&doc).unwrap();
//!
//! assert_eq!(flat["/title"], Value::from("Hello world"));
//! assert_eq!(flat["/foo/bar"], Value::from("baz"));
//! assert_eq!(unflatten(&flat).unwrap(), doc);
//! ```

use crate::{error::Result, Error, PartPath, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat `path -> value` representation of a document.
///
/// Values are scalars or the empty-container markers `[]` and `{}`.
pub type FlatMap = BTreeMap<PartPath, Value>;

/// Default separator between path segments.
pub const DEFAULT_SEPARATOR: char = '/';

/// Path conventions shared by `flatten` and `unflatten`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathConfig {
    /// Character joining segments
    pub separator: char,
    /// Whether rendered paths start with the separator (`/a/b` vs `a/b`)
    pub leading_separator: bool,
    /// Deepest container nesting `flatten` will descend into
    pub max_depth: usize,
    /// Largest segment value still treated as an array index
    pub max_array_index: usize,
    /// Fail on ambiguous container shapes instead of resolving them
    pub strict_containers: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            leading_separator: true,
            max_depth: 512,
            max_array_index: 65_535,
            strict_containers: false,
        }
    }
}

impl PathConfig {
    /// Dotted keys without a leading separator (`foo.bar.0`).
    pub fn dotted() -> Self {
        Self {
            separator: '.',
            leading_separator: false,
            ..Self::default()
        }
    }

    /// Builder-style method to set the separator.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Builder-style method to toggle the leading separator.
    pub fn with_leading_separator(mut self, leading: bool) -> Self {
        self.leading_separator = leading;
        self
    }

    /// Builder-style method to set the nesting limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Builder-style method to make container conflicts fatal.
    pub fn strict(mut self) -> Self {
        self.strict_containers = true;
        self
    }

    /// Reject configurations that cannot round-trip.
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_alphanumeric() || self.separator.is_whitespace() {
            return Err(Error::InvalidOptions(format!(
                "separator must be punctuation, got {:?}",
                self.separator
            )));
        }
        if self.max_depth == 0 {
            return Err(Error::InvalidOptions("max depth must be positive".into()));
        }
        Ok(())
    }

    /// Path of the document root.
    pub fn root_path(&self) -> PartPath {
        self.render(&[] as &[&str])
    }

    /// Join segments into a path.
    pub fn render<S: AsRef<str>>(&self, segments: &[S]) -> PartPath {
        let mut path = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 || self.leading_separator {
                path.push(self.separator);
            }
            path.push_str(segment.as_ref());
        }
        if segments.is_empty() && self.leading_separator {
            path.push(self.separator);
        }
        path
    }

    /// Split a path into segments.
    ///
    /// One leading separator is optional; the root (`/` or empty) has no
    /// segments. Inner empty segments are kept.
    pub fn split<'a>(&self, path: &'a str) -> Vec<&'a str> {
        let rest = path.strip_prefix(self.separator).unwrap_or(path);
        if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(self.separator).collect()
        }
    }

    /// Bring a path into the configured rendering.
    pub fn normalize(&self, path: &str) -> PartPath {
        self.render(&self.split(path))
    }

    /// Append one segment to a path.
    pub fn join(&self, prefix: &str, segment: &str) -> PartPath {
        let mut segments = self.split(prefix);
        segments.push(segment);
        self.render(&segments)
    }

    /// Array index encoded by a segment.
    ///
    /// Only canonical non-negative decimals count: `0` and `12` do, `01`,
    /// `-1` and `+2` do not.
    pub fn index_of(&self, segment: &str) -> Option<usize> {
        let canonical = !segment.is_empty()
            && segment.bytes().all(|b| b.is_ascii_digit())
            && (segment == "0" || !segment.starts_with('0'));
        if !canonical {
            return None;
        }
        segment
            .parse::<usize>()
            .ok()
            .filter(|index| *index <= self.max_array_index)
    }

    /// Flatten a document into leaf and empty-container paths.
    ///
    /// `Undefined` leaves are dropped and do not come back from `unflatten`.
    /// A leaf under a top-level empty key would render as the root path and
    /// is rejected; empty keys deeper down are fine.
    pub fn flatten(&self, doc: &Value) -> Result<FlatMap> {
        let mut flat = FlatMap::new();
        let mut segments = Vec::new();
        self.flatten_into(doc, &mut segments, &mut flat)?;
        Ok(flat)
    }

    fn flatten_into(
        &self,
        value: &Value,
        segments: &mut Vec<String>,
        flat: &mut FlatMap,
    ) -> Result<()> {
        let non_empty_container = value.is_container() && !value.is_empty_container();
        if non_empty_container && segments.len() >= self.max_depth {
            return Err(Error::CyclicStructure {
                path: self.render(segments),
                depth: self.max_depth,
            });
        }

        match value {
            Value::Undefined => {}
            Value::Array(items) if !items.is_empty() => {
                for (index, item) in items.iter().enumerate() {
                    segments.push(index.to_string());
                    self.flatten_into(item, segments, flat)?;
                    segments.pop();
                }
            }
            Value::Object(map) if !map.is_empty() => {
                for (key, item) in map {
                    if key.contains(self.separator) {
                        tracing::warn!(
                            key = %key,
                            separator = %self.separator,
                            "Key contains the path separator and will not round-trip"
                        );
                    }
                    segments.push(key.clone());
                    self.flatten_into(item, segments, flat)?;
                    segments.pop();
                }
            }
            leaf => {
                if let [only] = segments.as_slice() {
                    if only.is_empty() {
                        return Err(Error::AmbiguousContainerKind {
                            path: self.root_path(),
                            reason: "top-level empty key collides with the document root".into(),
                        });
                    }
                }
                flat.insert(self.render(segments), leaf.clone());
            }
        }

        Ok(())
    }

    /// Rebuild a document from a flat map.
    ///
    /// A level becomes a sequence only when every segment under it is an
    /// array index; gaps in the indices are filled with `Null`. Conflicts are
    /// resolved as follows, or rejected when `strict_containers` is set:
    ///
    /// - index and key segments under the same parent: a mapping is built
    /// - a scalar and a subtree at the same path: the scalar is kept
    /// - an empty marker whose kind disagrees with its children: children win
    ///
    /// An empty flat map yields an empty mapping. Paths with more than
    /// `max_depth` segments are rejected before anything is built.
    pub fn unflatten(&self, flat: &FlatMap) -> Result<Value> {
        let mut root = Node::default();

        for (path, value) in flat {
            let segments = self.split(path);
            if segments.len() > self.max_depth {
                return Err(Error::CyclicStructure {
                    path: path.clone(),
                    depth: self.max_depth,
                });
            }
            let mut node = &mut root;
            for segment in segments {
                node = node.children.entry(segment).or_default();
            }
            match node.leaf {
                Some(existing) if existing != value => {
                    if self.strict_containers {
                        return Err(Error::AmbiguousContainerKind {
                            path: self.normalize(path),
                            reason: "path assigned twice with different values".into(),
                        });
                    }
                    tracing::warn!(path = %path, "Duplicate path after normalization; keeping first value");
                }
                Some(_) => {}
                None => node.leaf = Some(value),
            }
        }

        if root.leaf.is_none() && root.children.is_empty() {
            return Ok(Value::object());
        }

        let mut segments = Vec::new();
        self.build(&root, &mut segments)
    }

    fn build<'a>(&self, node: &Node<'a>, segments: &mut Vec<&'a str>) -> Result<Value> {
        if node.children.is_empty() {
            return Ok(node.leaf.cloned().unwrap_or(Value::Undefined));
        }

        if let Some(leaf) = node.leaf.filter(|leaf| !leaf.is_empty_container()) {
            let path = self.render(segments);
            if self.strict_containers {
                return Err(Error::AmbiguousContainerKind {
                    path,
                    reason: format!("{} value conflicts with nested paths", leaf.kind()),
                });
            }
            tracing::warn!(path = %path, "Scalar and nested paths at the same position; keeping scalar");
            return Ok(leaf.clone());
        }

        let indexed = node
            .children
            .keys()
            .filter(|segment| self.index_of(segment).is_some())
            .count();
        let is_array = indexed == node.children.len();

        if indexed > 0 && !is_array {
            let path = self.render(segments);
            if self.strict_containers {
                return Err(Error::AmbiguousContainerKind {
                    path,
                    reason: "both index and key segments below".into(),
                });
            }
            tracing::warn!(path = %path, "Mixed index and key segments; building a mapping");
        }

        if let Some(marker) = node.leaf {
            let marker_is_array = matches!(marker, Value::Array(_));
            if marker_is_array != is_array {
                let path = self.render(segments);
                if self.strict_containers {
                    return Err(Error::AmbiguousContainerKind {
                        path,
                        reason: "empty marker kind disagrees with nested paths".into(),
                    });
                }
                tracing::warn!(path = %path, "Empty marker disagrees with nested paths; using nested paths");
            }
        }

        if is_array {
            let mut items: Vec<(usize, &Node<'a>, &'a str)> = node
                .children
                .iter()
                .filter_map(|(segment, child)| {
                    self.index_of(segment).map(|index| (index, child, *segment))
                })
                .collect();
            items.sort_by_key(|(index, _, _)| *index);

            let len = items.last().map_or(0, |(index, _, _)| index + 1);
            if len != items.len() {
                tracing::warn!(
                    path = %self.render(segments),
                    len,
                    present = items.len(),
                    "Sparse array indices; filling gaps with null"
                );
            }

            let mut array = vec![Value::Null; len];
            for (index, child, segment) in items {
                segments.push(segment);
                array[index] = self.build(child, segments)?;
                segments.pop();
            }
            Ok(Value::Array(array))
        } else {
            let mut map = BTreeMap::new();
            for (segment, child) in &node.children {
                segments.push(*segment);
                map.insert(segment.to_string(), self.build(child, segments)?);
                segments.pop();
            }
            Ok(Value::Object(map))
        }
    }
}

/// Segment trie built while unflattening.
#[derive(Debug, Default)]
struct Node<'a> {
    leaf: Option<&'a Value>,
    children: BTreeMap<&'a str, Node<'a>>,
}

/// Flatten with the default `/`-separated convention.
pub fn flatten(doc: &Value) -> Result<FlatMap> {
    PathConfig::default().flatten(doc)
}

/// Unflatten with the default `/`-separated convention.
pub fn unflatten(flat: &FlatMap) -> Result<Value> {
    PathConfig::default().unflatten(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Value {
        Value::from(value)
    }

    fn flat(entries: &[(&str, Value)]) -> FlatMap {
        entries
            .iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn flatten_nested_document() {
        let d = doc(json!({"title": "Hello world", "foo": {"bar": "baz"}}));
        let f = flatten(&d).unwrap();

        assert_eq!(
            f,
            flat(&[
                ("/title", Value::from("Hello world")),
                ("/foo/bar", Value::from("baz")),
            ])
        );
        assert_eq!(unflatten(&f).unwrap(), d);
    }

    #[test]
    fn empty_containers_preserved() {
        let d = doc(json!({"a": [], "b": {}}));
        let f = flatten(&d).unwrap();

        assert_eq!(
            f,
            flat(&[("/a", Value::array()), ("/b", Value::object())])
        );
        assert_eq!(unflatten(&f).unwrap(), d);
    }

    #[test]
    fn arrays_use_index_segments() {
        let d = doc(json!({"tags": ["x", "y"], "rows": [{"id": 1}, {"id": 2}]}));
        let f = flatten(&d).unwrap();

        assert_eq!(f["/tags/0"], Value::from("x"));
        assert_eq!(f["/rows/1/id"], Value::from(2i64));
        assert_eq!(unflatten(&f).unwrap(), d);
    }

    #[test]
    fn undefined_leaves_are_dropped() {
        let mut map = BTreeMap::new();
        map.insert("kept".to_string(), Value::from("yes"));
        map.insert("gone".to_string(), Value::Undefined);
        let d = Value::Object(map);

        let f = flatten(&d).unwrap();
        assert_eq!(f.len(), 1);
        assert!(!f.contains_key("/gone"));

        let restored = unflatten(&f).unwrap();
        assert_ne!(restored, d);
        assert_eq!(restored, doc(json!({"kept": "yes"})));
    }

    #[test]
    fn scalar_root_uses_root_path() {
        let f = flatten(&Value::from("whole")).unwrap();
        assert_eq!(f, flat(&[("/", Value::from("whole"))]));
        assert_eq!(unflatten(&f).unwrap(), Value::from("whole"));

        let f = flatten(&Value::object()).unwrap();
        assert_eq!(f, flat(&[("/", Value::object())]));
        assert_eq!(unflatten(&FlatMap::new()).unwrap(), Value::object());
    }

    #[test]
    fn unsorted_and_unnormalized_input() {
        let f = flat(&[("b/1", Value::from("second")), ("/b/0", Value::from("first"))]);
        assert_eq!(unflatten(&f).unwrap(), doc(json!({"b": ["first", "second"]})));
    }

    #[test]
    fn non_canonical_numbers_are_keys() {
        let f = flat(&[("/a/01", Value::from(1i64)), ("/a/-1", Value::from(2i64))]);
        assert_eq!(unflatten(&f).unwrap(), doc(json!({"a": {"01": 1, "-1": 2}})));
    }

    #[test]
    fn mixed_siblings_build_a_mapping() {
        let f = flat(&[("/a/0", Value::from("x")), ("/a/foo", Value::from("y"))]);
        assert_eq!(unflatten(&f).unwrap(), doc(json!({"a": {"0": "x", "foo": "y"}})));
    }

    #[test]
    fn mixed_siblings_rejected_when_strict() {
        let f = flat(&[("/a/0", Value::from("x")), ("/a/foo", Value::from("y"))]);
        let result = PathConfig::default().strict().unflatten(&f);
        assert!(matches!(
            result,
            Err(Error::AmbiguousContainerKind { path, .. }) if path == "/a"
        ));
    }

    #[test]
    fn scalar_wins_over_subtree() {
        let f = flat(&[("/a", Value::from(1i64)), ("/a/b", Value::from(2i64))]);
        assert_eq!(unflatten(&f).unwrap(), doc(json!({"a": 1})));

        let result = PathConfig::default().strict().unflatten(&f);
        assert!(matches!(result, Err(Error::AmbiguousContainerKind { .. })));
    }

    #[test]
    fn marker_yields_to_children() {
        let f = flat(&[("/a", Value::object()), ("/a/0", Value::from("x"))]);
        assert_eq!(unflatten(&f).unwrap(), doc(json!({"a": ["x"]})));

        let f = flat(&[("/a", Value::array()), ("/a/0", Value::from("x"))]);
        assert_eq!(
            PathConfig::default().strict().unflatten(&f).unwrap(),
            doc(json!({"a": ["x"]}))
        );
    }

    #[test]
    fn sparse_indices_fill_with_null() {
        let f = flat(&[("/a/0", Value::from("x")), ("/a/2", Value::from("z"))]);
        assert_eq!(unflatten(&f).unwrap(), doc(json!({"a": ["x", null, "z"]})));
    }

    #[test]
    fn huge_index_is_a_key() {
        let f = flat(&[("/a/99999999999", Value::from("far"))]);
        assert_eq!(
            unflatten(&f).unwrap(),
            doc(json!({"a": {"99999999999": "far"}}))
        );
    }

    #[test]
    fn depth_limit_reports_cycle() {
        let mut d = Value::from("leaf");
        for _ in 0..10 {
            let mut map = BTreeMap::new();
            map.insert("a".to_string(), d);
            d = Value::Object(map);
        }

        let config = PathConfig::default().with_max_depth(4);
        let result = config.flatten(&d);
        assert!(matches!(
            result,
            Err(Error::CyclicStructure { path, depth: 4 }) if path == "/a/a/a/a"
        ));
        assert!(PathConfig::default().flatten(&d).is_ok());
    }

    #[test]
    fn unflatten_rejects_paths_beyond_depth_limit() {
        let config = PathConfig::default().with_max_depth(4);
        assert!(config.unflatten(&flat(&[("/a/a/a/a", Value::from(1i64))])).is_ok());

        let deep = "/a".repeat(5);
        let result = config.unflatten(&flat(&[(deep.as_str(), Value::from(1i64))]));
        assert!(matches!(
            result,
            Err(Error::CyclicStructure { path, depth: 4 }) if path == deep
        ));

        let hostile = "/a".repeat(200_000);
        assert!(matches!(
            unflatten(&flat(&[(hostile.as_str(), Value::from("x"))])),
            Err(Error::CyclicStructure { depth: 512, .. })
        ));
    }

    #[test]
    fn top_level_empty_key_is_rejected() {
        let d = doc(json!({"": "x", "a": 2}));
        assert!(matches!(
            flatten(&d),
            Err(Error::AmbiguousContainerKind { path, .. }) if path == "/"
        ));
        assert!(flatten(&doc(json!({"": []}))).is_err());

        let slashless = PathConfig::default().with_leading_separator(false);
        assert!(slashless.flatten(&d).is_err());

        // Below the top level, and above a subtree, the empty key survives.
        let nested = doc(json!({"": {"b": 1}, "a": {"": 2}}));
        let f = flatten(&nested).unwrap();
        assert_eq!(
            f,
            flat(&[("//b", Value::from(1i64)), ("/a/", Value::from(2i64))])
        );
        assert_eq!(unflatten(&f).unwrap(), nested);
    }

    #[test]
    fn dotted_convention() {
        let config = PathConfig::dotted();
        let d = doc(json!({"foo": {"bar": [1, 2]}}));
        let f = config.flatten(&d).unwrap();

        assert!(f.contains_key("foo.bar.0"));
        assert!(f.contains_key("foo.bar.1"));
        assert_eq!(config.root_path(), "");
        assert_eq!(config.unflatten(&f).unwrap(), d);
    }

    #[test]
    fn path_helpers() {
        let config = PathConfig::default();
        assert_eq!(config.root_path(), "/");
        assert_eq!(config.normalize("a/b"), "/a/b");
        assert_eq!(config.normalize("/"), "/");
        assert_eq!(config.normalize(""), "/");
        assert_eq!(config.join("/a", "b"), "/a/b");
        assert_eq!(config.join("/", "b"), "/b");
        assert_eq!(config.split("/a//b"), vec!["a", "", "b"]);
        assert_eq!(config.index_of("0"), Some(0));
        assert_eq!(config.index_of("42"), Some(42));
        assert_eq!(config.index_of("007"), None);
        assert_eq!(config.index_of(""), None);
    }

    #[test]
    fn validate_config() {
        assert!(PathConfig::default().validate().is_ok());
        assert!(PathConfig::dotted().validate().is_ok());
        assert!(matches!(
            PathConfig::default().with_separator('x').validate(),
            Err(Error::InvalidOptions(_))
        ));
        assert!(PathConfig::default().with_max_depth(0).validate().is_err());
    }

    #[test]
    fn config_from_json() {
        let config: PathConfig =
            serde_json::from_str(r#"{"separator": ".", "leadingSeparator": false}"#).unwrap();
        assert_eq!(config, PathConfig::dotted());
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_leaf() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::from),
                "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
                proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
            ]
        }

        fn arb_document() -> impl Strategy<Value = Value> {
            arb_leaf().prop_recursive(4, 32, 4, |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    proptest::collection::btree_map("[a-z_]{1,6}", inner, 0..4)
                        .prop_map(Value::Object),
                ]
            })
        }

        fn arb_blank_keyed_document() -> impl Strategy<Value = Value> {
            arb_leaf().prop_recursive(3, 16, 3, |inner| {
                proptest::collection::btree_map("[a-z]{0,2}", inner, 1..3).prop_map(Value::Object)
            })
        }

        proptest! {
            #[test]
            fn prop_nested_empty_keys_roundtrip(d in arb_blank_keyed_document()) {
                let mut root = BTreeMap::new();
                root.insert("root".to_string(), d);
                let wrapped = Value::Object(root);
                let f = flatten(&wrapped).unwrap();
                prop_assert_eq!(unflatten(&f).unwrap(), wrapped);
            }

            #[test]
            fn prop_roundtrip_identity(d in arb_document()) {
                let f = flatten(&d).unwrap();
                prop_assert_eq!(unflatten(&f).unwrap(), d);
            }

            #[test]
            fn prop_flatten_deterministic(d in arb_document()) {
                prop_assert_eq!(flatten(&d).unwrap(), flatten(&d.clone()).unwrap());
            }

            #[test]
            fn prop_flat_values_are_leaves(d in arb_document()) {
                for value in flatten(&d).unwrap().values() {
                    prop_assert!(!value.is_container() || value.is_empty_container());
                }
            }
        }
    }
}
