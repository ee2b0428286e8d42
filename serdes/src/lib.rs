//! # Paneron SerDes
//!
//! Object (de)serialization for Paneron extensions.
//!
//! Extensions work with nested documents; storage works with flat maps of
//! slash-delimited paths to raw bytes. This crate converts between the two.
//!
//! ## Design Principles
//!
//! - **No IO**: buffers come in, documents go out, and vice versa
//! - **Deterministic**: the same document always serializes to the same buffers
//! - **Loss-aware**: empty containers survive; the few lossy cases are documented
//!
//! ## Core Concepts
//!
//! ### Path flattening
//!
//! [`flatten`] turns a [`Value`] tree into a [`FlatMap`] keyed by part paths
//! such as `/foo/bar`; [`unflatten`] rebuilds the tree, treating a level as
//! an array when every segment below it is an index. [`PathConfig`] controls
//! the separator and the leading-separator convention.
//!
//! ### Leaf codecs
//!
//! A [`LeafCodec`] encodes one leaf to bytes: text, number, JSON, YAML or
//! binary, selected by a [`DataType`] tag.
//!
//! ### Rules
//!
//! A [`SerDesRule`] serializes whole documents into a [`BufferMap`], either
//! as a single file or as one part per leaf. [`SerDesOptions`] override the
//! data type of individual parts.
//!
//! ### Registry
//!
//! A [`Registry`] selects the rule for a storage path with [`PathMatcher`]s,
//! first match wins.
//!
//! ## Quick Start
//!
//! ```rust
//! use paneron_serdes::{Registry, SerDesOptions, Value};
//! use serde_json::json;
//!
//! // 1. Build a registry
//! let registry = Registry::with_defaults();
//!
//! // 2. Serialize a document for the path it will be stored at
//! let doc = Value::from(json!({"title": "Hello world", "count": 3}));
//! let buffers = registry
//!     .serialize_path("/item.json", &doc, &SerDesOptions::new())
//!     .unwrap();
//! assert_eq!(buffers.len(), 1);
//!
//! // 3. Read it back
//! let restored = registry
//!     .deserialize_path("/item.json", &buffers, &SerDesOptions::new())
//!     .unwrap();
//! assert_eq!(restored, doc);
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides C-compatible functions for the host
//! application. Documents cross the boundary as JSON strings, buffers as
//! base64.

pub mod codec;
pub mod error;
pub mod ffi;
pub mod path;
pub mod registry;
pub mod rule;
pub mod value;

// Re-export main types at crate root
pub use codec::{DataType, LeafCodec};
pub use error::Error;
pub use path::{flatten, unflatten, FlatMap, PathConfig};
pub use registry::{PathMatcher, Registry};
pub use rule::{BufferMap, BuiltinRule, Layout, PartOptions, SerDesOptions, SerDesRule};
pub use value::Value;

/// Type aliases for clarity
pub type PartPath = String;
pub type RuleId = String;
pub type OwnerId = String;
