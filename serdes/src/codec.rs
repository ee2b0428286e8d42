//! Leaf codecs.
//!
//! A leaf codec turns one flat value into the bytes of one storage part and
//! back. The set of codecs is closed: [`DataType`] tags select a
//! [`LeafCodec`] variant once, and dispatch is a plain `match`.

use crate::{error::Result, Error, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use yaml_rust2::parser::{Event, EventReceiver, Parser};
use yaml_rust2::scanner::TScalarStyle;
use yaml_rust2::yaml::{Hash, Yaml};
use yaml_rust2::YamlEmitter;

/// Data type tag attached to a part in serialization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Text,
    Number,
    Json,
    Yaml,
    Binary,
    /// Any unrecognized tag. Handled as text.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Text => write!(f, "text"),
            DataType::Number => write!(f, "number"),
            DataType::Json => write!(f, "json"),
            DataType::Yaml => write!(f, "yaml"),
            DataType::Binary => write!(f, "binary"),
            DataType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Byte codec for a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafCodec {
    /// UTF-8 text
    Text,
    /// Decimal number rendered as text
    Number,
    /// RFC 8259 JSON
    Json,
    /// YAML with the extended boolean and timestamp resolution
    Yaml,
    /// Raw bytes
    Binary,
}

impl LeafCodec {
    /// Resolve the codec for a data type. Unknown tags fall back to text.
    pub fn for_type(data_type: DataType) -> Self {
        match data_type {
            DataType::Text | DataType::Unknown => LeafCodec::Text,
            DataType::Number => LeafCodec::Number,
            DataType::Json => LeafCodec::Json,
            DataType::Yaml => LeafCodec::Yaml,
            DataType::Binary => LeafCodec::Binary,
        }
    }

    /// Data type this codec is reported as in errors.
    pub fn data_type(&self) -> DataType {
        match self {
            LeafCodec::Text => DataType::Text,
            LeafCodec::Number => DataType::Number,
            LeafCodec::Json => DataType::Json,
            LeafCodec::Yaml => DataType::Yaml,
            LeafCodec::Binary => DataType::Binary,
        }
    }

    /// Encode a leaf stored at `path`.
    pub fn encode(&self, path: &str, value: &Value) -> Result<Vec<u8>> {
        let encoded = match self {
            LeafCodec::Text => encode_text(value),
            LeafCodec::Number => encode_number(value),
            LeafCodec::Json => serde_json::to_vec_pretty(&value.to_json()).map_err(|e| e.to_string()),
            LeafCodec::Yaml => to_yaml(value).map(String::into_bytes),
            LeafCodec::Binary => value
                .as_binary()
                .map(|bytes| bytes.into_owned())
                .ok_or_else(|| format!("expected bytes, got {}", value.kind())),
        };

        encoded.map_err(|reason| Error::Encode {
            path: path.to_string(),
            data_type: self.data_type(),
            reason,
        })
    }

    /// Decode the bytes of the part stored at `path`.
    pub fn decode(&self, path: &str, bytes: &[u8]) -> Result<Value> {
        let decoded = match self {
            LeafCodec::Text => decode_utf8(bytes).map(|s| Value::String(s.to_string())),
            LeafCodec::Number => decode_utf8(bytes).and_then(decode_number),
            LeafCodec::Json => serde_json::from_slice::<serde_json::Value>(bytes)
                .map(Value::from)
                .map_err(|e| e.to_string()),
            LeafCodec::Yaml => decode_utf8(bytes).and_then(from_yaml),
            LeafCodec::Binary => Ok(Value::Bytes(bytes.to_vec())),
        };

        decoded.map_err(|reason| Error::Decode {
            path: path.to_string(),
            data_type: self.data_type(),
            reason,
        })
    }
}

fn decode_utf8(bytes: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))
}

fn encode_text(value: &Value) -> std::result::Result<Vec<u8>, String> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Number(n) => Ok(n.to_string().into_bytes()),
        Value::Bool(b) => Ok(b.to_string().into_bytes()),
        Value::Bytes(bytes) => Ok(bytes.clone()),
        other => Err(format!("expected text, got {}", other.kind())),
    }
}

fn encode_number(value: &Value) -> std::result::Result<Vec<u8>, String> {
    match value {
        Value::Number(n) => Ok(n.to_string().into_bytes()),
        other => Err(format!("expected number, got {}", other.kind())),
    }
}

fn decode_number(text: &str) -> std::result::Result<Value, String> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::from(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Ok(Value::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("not a finite number: {:?}", text))
}

/// Plain scalars read as `true` in addition to the YAML 1.2 core forms.
const YAML_TRUE: &[&str] = &["true", "True", "TRUE", "yes", "Yes", "YES"];
/// Plain scalars read as `false` in addition to the YAML 1.2 core forms.
const YAML_FALSE: &[&str] = &["false", "False", "FALSE", "no", "No", "NO"];
const YAML_NULL: &[&str] = &["", "~", "null", "Null", "NULL"];
const YAML_NON_FINITE: &[&str] = &[
    ".inf", ".Inf", ".INF", "+.inf", "+.Inf", "+.INF", "-.inf", "-.Inf", "-.INF", ".nan",
    ".NaN", ".NAN",
];

/// Render a value as a YAML document.
///
/// The emitter quotes every string a plain scalar would resolve to something
/// else (booleans, nulls, numbers, anything containing `:`), so strings that
/// look like `yes` or a date-time come back as strings.
pub fn to_yaml(value: &Value) -> std::result::Result<String, String> {
    let mut out = String::new();
    YamlEmitter::new(&mut out)
        .dump(&yaml_node(&value.to_json()))
        .map_err(|e| e.to_string())?;
    out.push('\n');
    Ok(out)
}

fn yaml_node(value: &serde_json::Value) -> Yaml {
    match value {
        serde_json::Value::Null => Yaml::Null,
        serde_json::Value::Bool(b) => Yaml::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Yaml::Integer(i),
            None => Yaml::Real(n.to_string()),
        },
        serde_json::Value::String(s) => Yaml::String(s.clone()),
        serde_json::Value::Array(items) => Yaml::Array(items.iter().map(yaml_node).collect()),
        serde_json::Value::Object(map) => {
            let mut hash = Hash::new();
            for (key, item) in map {
                hash.insert(Yaml::String(key.clone()), yaml_node(item));
            }
            Yaml::Hash(hash)
        }
    }
}

/// Parse the first YAML document in `text`, applying the extended schema.
///
/// Only plain scalars are resolved; quoted and block scalars, and scalars
/// tagged `!!str`, stay strings. An empty stream reads as `Null`.
pub fn from_yaml(text: &str) -> std::result::Result<Value, String> {
    let mut builder = YamlBuilder::default();
    Parser::new(text.chars())
        .load(&mut builder, false)
        .map_err(|e| e.to_string())?;
    match builder.error {
        Some(reason) => Err(reason),
        None => Ok(builder.root.unwrap_or(Value::Null)),
    }
}

/// Collection being assembled from parser events.
enum Frame {
    Sequence {
        anchor: usize,
        items: Vec<Value>,
    },
    Mapping {
        anchor: usize,
        entries: BTreeMap<String, Value>,
        key: Option<String>,
    },
}

#[derive(Default)]
struct YamlBuilder {
    stack: Vec<Frame>,
    anchors: BTreeMap<usize, Value>,
    root: Option<Value>,
    error: Option<String>,
}

impl YamlBuilder {
    fn remember(&mut self, anchor: usize, value: &Value) {
        if anchor > 0 {
            self.anchors.insert(anchor, value.clone());
        }
    }

    /// Attach a finished node to its parent. `key_text` is the source text
    /// of a scalar, used verbatim when the node sits in key position.
    fn attach(&mut self, value: Value, key_text: Option<String>) {
        match self.stack.last_mut() {
            None => {
                if self.root.is_none() {
                    self.root = Some(value);
                }
            }
            Some(Frame::Sequence { items, .. }) => items.push(value),
            Some(Frame::Mapping { entries, key, .. }) => match (key.take(), key_text) {
                (Some(name), _) => {
                    entries.insert(name, value);
                }
                (None, Some(text)) => *key = Some(text),
                (None, None) => {
                    self.error = Some(format!("unsupported mapping key: {}", value.kind()));
                }
            },
        }
    }
}

impl EventReceiver for YamlBuilder {
    fn on_event(&mut self, event: Event) {
        if self.error.is_some() {
            return;
        }

        let finished = match event {
            Event::Scalar(text, style, anchor, tag) => {
                let verbatim = !matches!(style, TScalarStyle::Plain)
                    || tag.as_ref().is_some_and(|tag| tag.suffix == "str");
                let resolved = if verbatim {
                    Ok(Value::String(text.clone()))
                } else {
                    resolve_plain(&text)
                };
                match resolved {
                    Ok(value) => {
                        self.remember(anchor, &value);
                        Some((value, Some(text)))
                    }
                    Err(reason) => {
                        self.error = Some(reason);
                        None
                    }
                }
            }
            Event::Alias(anchor) => match self.anchors.get(&anchor) {
                Some(value) => Some((value.clone(), value.as_str().map(str::to_string))),
                None => {
                    self.error = Some(format!("unknown alias {}", anchor));
                    None
                }
            },
            Event::SequenceStart(anchor, ..) => {
                self.stack.push(Frame::Sequence {
                    anchor,
                    items: Vec::new(),
                });
                None
            }
            Event::MappingStart(anchor, ..) => {
                self.stack.push(Frame::Mapping {
                    anchor,
                    entries: BTreeMap::new(),
                    key: None,
                });
                None
            }
            Event::SequenceEnd | Event::MappingEnd => {
                let (anchor, value) = match self.stack.pop() {
                    Some(Frame::Sequence { anchor, items }) => (anchor, Value::Array(items)),
                    Some(Frame::Mapping { anchor, entries, .. }) => {
                        (anchor, Value::Object(entries))
                    }
                    None => return,
                };
                self.remember(anchor, &value);
                Some((value, None))
            }
            _ => None,
        };

        if let Some((value, key_text)) = finished {
            self.attach(value, key_text);
        }
    }
}

/// Resolve a plain scalar: null, extended booleans, numbers, timestamps,
/// otherwise the text itself.
fn resolve_plain(text: &str) -> std::result::Result<Value, String> {
    if YAML_NULL.contains(&text) {
        return Ok(Value::Null);
    }
    if YAML_TRUE.contains(&text) {
        return Ok(Value::Bool(true));
    }
    if YAML_FALSE.contains(&text) {
        return Ok(Value::Bool(false));
    }
    if YAML_NON_FINITE.contains(&text) {
        return Err(format!("non-finite number: {}", text));
    }
    if let Some(number) = resolve_number(text) {
        return Ok(number);
    }
    Ok(Value::String(
        parse_timestamp(text).unwrap_or_else(|| text.to_string()),
    ))
}

fn resolve_number(text: &str) -> Option<Value> {
    if let Some(hex) = text.strip_prefix("0x") {
        return i64::from_str_radix(hex, 16).ok().map(Value::from);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Some(Value::from(n));
    }
    let numeric = text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !numeric {
        return None;
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Normalize a YAML timestamp.
///
/// Date-only values are kept as written. Date-times become RFC 3339 in UTC
/// with millisecond precision; a missing offset means UTC. Returns `None`
/// for anything that is not a valid timestamp.
pub fn parse_timestamp(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let looks_like_date = bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-';
    if !looks_like_date {
        return None;
    }

    if s.len() == 10 {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(|_| s.to_string());
    }

    let with_offset = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %:z"))
        .map(|dt| dt.with_timezone(&Utc));

    let parsed = with_offset.ok().or_else(|| {
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
            .map(|naive| naive.and_utc())
    })?;

    Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}
