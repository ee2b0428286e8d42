//! FFI layer for the host application.
//!
//! This module provides C-compatible functions the Paneron host can call.
//! Documents and options cross the boundary as JSON strings; buffer maps
//! cross as JSON objects of part path to base64-encoded bytes.
//!
//! # Memory Management
//!
//! - Strings returned by `paneron_*` functions are allocated by Rust
//! - Caller must free them with `paneron_string_free`
//! - Registry pointers must be freed with `paneron_registry_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure

use crate::{
    rule::BufferMap, BuiltinRule, FlatMap, PathMatcher, Registry, SerDesOptions, SerDesRule,
    Value,
};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::ffi::{c_char, CStr, CString};

/// Outcome of one call as it crosses the boundary.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum Response<T: serde::Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: serde::Serialize> From<Result<T, String>> for Response<T> {
    fn from(result: Result<T, String>) -> Self {
        match result {
            Ok(ok) => Response::Ok { ok },
            Err(error) => Response::Err { error },
        }
    }
}

/// Render a call outcome as an owned C string.
/// Caller must free with `paneron_string_free`.
fn respond<T: serde::Serialize>(result: Result<T, String>) -> *mut c_char {
    let json = serde_json::to_string(&Response::from(result))
        .unwrap_or_else(|e| format!(r#"{{"error":"response encoding failed: {}"}}"#, e));
    match CString::new(json) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::from(c"{\"error\":\"response contained null bytes\"}").into_raw(),
    }
}

/// Read a string argument. Null pointers and invalid UTF-8 are reported
/// under `name`.
unsafe fn read_arg(ptr: *const c_char, name: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("missing {}", name));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_string)
        .map_err(|_| format!("invalid {}: not UTF-8", name))
}

/// Read and parse a JSON argument.
unsafe fn read_json<T: DeserializeOwned>(ptr: *const c_char, name: &str) -> Result<T, String> {
    let text = read_arg(ptr, name)?;
    serde_json::from_str(&text).map_err(|e| format!("{} parse error: {}", name, e))
}

/// Read serialization options. A null pointer means default options.
unsafe fn read_options(ptr: *const c_char) -> Result<SerDesOptions, String> {
    if ptr.is_null() {
        return Ok(SerDesOptions::default());
    }
    read_json(ptr, "options")
}

/// Read a buffer map sent as `{path: base64}`.
unsafe fn read_buffers(ptr: *const c_char) -> Result<BufferMap, String> {
    let encoded: BTreeMap<String, String> = read_json(ptr, "buffers")?;
    encoded
        .into_iter()
        .map(|(path, data)| {
            B64.decode(&data)
                .map(|bytes| (path.clone(), bytes))
                .map_err(|e| format!("invalid base64 for '{}': {}", path, e))
        })
        .collect()
}

unsafe fn read_rule(ptr: *const c_char) -> Result<SerDesRule, String> {
    let id = read_arg(ptr, "rule id")?;
    BuiltinRule::from_id(&id)
        .map(|builtin| builtin.rule())
        .ok_or_else(|| crate::Error::UnknownRule(id).to_string())
}

unsafe fn registry_ref<'a>(registry: *const Registry) -> Result<&'a Registry, String> {
    registry.as_ref().ok_or_else(|| "null registry pointer".to_string())
}

fn encode_buffers(buffers: BufferMap) -> BTreeMap<String, String> {
    buffers
        .into_iter()
        .map(|(path, bytes)| (path, B64.encode(bytes)))
        .collect()
}

fn reason(error: crate::Error) -> String {
    error.to_string()
}

// ============================================================================
// Rule Operations
// ============================================================================

/// Serialize a document with a builtin rule.
///
/// # Arguments
/// - `rule_id`: builtin rule identifier (e.g. `json-file`)
/// - `doc_json`: JSON document
/// - `opts_json`: JSON SerDesOptions, or null for defaults
///
/// # Returns
/// JSON string: `{"ok": {path: base64}}` or `{"error": "message"}`
///
/// # Safety
/// - `rule_id` and `doc_json` must be valid null-terminated C strings or null
/// - `opts_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_serialize(
    rule_id: *const c_char,
    doc_json: *const c_char,
    opts_json: *const c_char,
) -> *mut c_char {
    let result = (|| -> Result<BTreeMap<String, String>, String> {
        let rule = read_rule(rule_id)?;
        let doc: Value = read_json(doc_json, "document")?;
        let opts = read_options(opts_json)?;
        rule.serialize(&doc, &opts).map(encode_buffers).map_err(reason)
    })();
    respond(result)
}

/// Deserialize buffers with a builtin rule.
///
/// # Arguments
/// - `rule_id`: builtin rule identifier
/// - `buffers_json`: JSON object of part path to base64 bytes
/// - `opts_json`: JSON SerDesOptions, or null for defaults
///
/// # Returns
/// JSON string: `{"ok": document}` or `{"error": "message"}`
///
/// # Safety
/// - `rule_id` and `buffers_json` must be valid null-terminated C strings or null
/// - `opts_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_deserialize(
    rule_id: *const c_char,
    buffers_json: *const c_char,
    opts_json: *const c_char,
) -> *mut c_char {
    let result = (|| -> Result<Value, String> {
        let rule = read_rule(rule_id)?;
        let buffers = read_buffers(buffers_json)?;
        let opts = read_options(opts_json)?;
        rule.deserialize(&buffers, &opts).map_err(reason)
    })();
    respond(result)
}

/// Flatten a JSON document into `{path: value}`.
///
/// # Safety
/// - `doc_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_flatten(doc_json: *const c_char) -> *mut c_char {
    let result = read_json::<Value>(doc_json, "document")
        .and_then(|doc| crate::flatten(&doc).map_err(reason));
    respond(result)
}

/// Rebuild a JSON document from `{path: value}`.
///
/// # Safety
/// - `flat_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_unflatten(flat_json: *const c_char) -> *mut c_char {
    let result = read_json::<FlatMap>(flat_json, "flat map")
        .and_then(|flat| crate::unflatten(&flat).map_err(reason));
    respond(result)
}

// ============================================================================
// Registry Lifecycle
// ============================================================================

/// Create a registry holding the default file rules.
///
/// # Returns
/// Pointer to Registry. Never null.
///
/// Caller must free the returned pointer with `paneron_registry_free`.
#[no_mangle]
pub extern "C" fn paneron_registry_new() -> *mut Registry {
    Box::into_raw(Box::new(Registry::with_defaults()))
}

/// Free a registry.
///
/// # Safety
/// - `registry` must be a valid pointer from `paneron_registry_new`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn paneron_registry_free(registry: *mut Registry) {
    if !registry.is_null() {
        drop(Box::from_raw(registry));
    }
}

/// Free a string allocated by this library.
///
/// # Safety
/// - `s` must be a valid pointer from a `paneron_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn paneron_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Registry Operations
// ============================================================================

/// Register a builtin rule for paths with the given extensions.
///
/// # Arguments
/// - `owner`: owner ID used by `paneron_registry_unregister`
/// - `rule_id`: builtin rule identifier
/// - `extensions_json`: JSON array of extensions; empty matches every path
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `registry` must be a valid pointer from `paneron_registry_new` or null
/// - String arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_registry_register(
    registry: *mut Registry,
    owner: *const c_char,
    rule_id: *const c_char,
    extensions_json: *const c_char,
) -> *mut c_char {
    let result = (|| -> Result<(), String> {
        let registry = registry
            .as_mut()
            .ok_or_else(|| "null registry pointer".to_string())?;
        let owner = read_arg(owner, "owner")?;
        let rule = read_rule(rule_id)?;
        let extensions: Vec<String> = read_json(extensions_json, "extensions")?;
        registry.register(owner, rule, PathMatcher::extensions(extensions));
        Ok(())
    })();
    respond(result)
}

/// Remove every rule registered by an owner.
///
/// # Returns
/// Number of removed rules, or -1 on invalid arguments.
///
/// # Safety
/// - `registry` must be a valid pointer from `paneron_registry_new` or null
/// - `owner` must be a valid null-terminated C string or null
#[no_mangle]
pub unsafe extern "C" fn paneron_registry_unregister(
    registry: *mut Registry,
    owner: *const c_char,
) -> i64 {
    match (registry.as_mut(), read_arg(owner, "owner")) {
        (Some(registry), Ok(owner)) => registry.unregister(&owner) as i64,
        _ => -1,
    }
}

/// Identifier of the rule selected for a storage path.
///
/// # Returns
/// JSON string: `{"ok": "rule-id"}` or `{"error": "message"}`
///
/// # Safety
/// - `registry` must be a valid pointer from `paneron_registry_new` or null
/// - `path` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_registry_resolve(
    registry: *const Registry,
    path: *const c_char,
) -> *mut c_char {
    let result = (|| -> Result<String, String> {
        let registry = registry_ref(registry)?;
        let path = read_arg(path, "path")?;
        registry
            .resolve(&path)
            .map(|rule| rule.id.clone())
            .map_err(reason)
    })();
    respond(result)
}

/// Serialize a document with the rule selected for `path`.
///
/// # Returns
/// JSON string: `{"ok": {path: base64}}` or `{"error": "message"}`
///
/// # Safety
/// - `registry` must be a valid pointer from `paneron_registry_new` or null
/// - String arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_registry_serialize(
    registry: *const Registry,
    path: *const c_char,
    doc_json: *const c_char,
    opts_json: *const c_char,
) -> *mut c_char {
    let result = (|| -> Result<BTreeMap<String, String>, String> {
        let registry = registry_ref(registry)?;
        let path = read_arg(path, "path")?;
        let doc: Value = read_json(doc_json, "document")?;
        let opts = read_options(opts_json)?;
        registry
            .serialize_path(&path, &doc, &opts)
            .map(encode_buffers)
            .map_err(reason)
    })();
    respond(result)
}

/// Deserialize buffers with the rule selected for `path`.
///
/// # Returns
/// JSON string: `{"ok": document}` or `{"error": "message"}`
///
/// # Safety
/// - `registry` must be a valid pointer from `paneron_registry_new` or null
/// - String arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `paneron_string_free`
#[no_mangle]
pub unsafe extern "C" fn paneron_registry_deserialize(
    registry: *const Registry,
    path: *const c_char,
    buffers_json: *const c_char,
    opts_json: *const c_char,
) -> *mut c_char {
    let result = (|| -> Result<Value, String> {
        let registry = registry_ref(registry)?;
        let path = read_arg(path, "path")?;
        let buffers = read_buffers(buffers_json)?;
        let opts = read_options(opts_json)?;
        registry
            .deserialize_path(&path, &buffers, &opts)
            .map_err(reason)
    })();
    respond(result)
}

// ============================================================================
// Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn paneron_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
