//! Error types for the serialization core.

use crate::{codec::DataType, PartPath};
use thiserror::Error;

/// All possible errors from flattening, leaf codecs and rule resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Structure errors
    #[error("structure at '{path}' nests deeper than {depth} levels (cyclic input?)")]
    CyclicStructure { path: PartPath, depth: usize },

    #[error("ambiguous container at '{path}': {reason}")]
    AmbiguousContainerKind { path: PartPath, reason: String },

    // Leaf codec errors
    #[error("cannot decode '{path}' as {data_type}: {reason}")]
    Decode {
        path: PartPath,
        data_type: DataType,
        reason: String,
    },

    #[error("cannot encode '{path}' as {data_type}: {reason}")]
    Encode {
        path: PartPath,
        data_type: DataType,
        reason: String,
    },

    // Registry errors
    #[error("no serialization rule matches path: {0}")]
    UnsupportedPath(PartPath),

    #[error("unknown serialization rule: {0}")]
    UnknownRule(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// Path of the part the error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::CyclicStructure { path, .. }
            | Error::AmbiguousContainerKind { path, .. }
            | Error::Decode { path, .. }
            | Error::Encode { path, .. }
            | Error::UnsupportedPath(path) => Some(path),
            Error::UnknownRule(_) | Error::InvalidOptions(_) => None,
        }
    }
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnsupportedPath("/a.bin".into());
        assert_eq!(err.to_string(), "no serialization rule matches path: /a.bin");

        let err = Error::Decode {
            path: "/count".into(),
            data_type: DataType::Number,
            reason: "not a number".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot decode '/count' as number: not a number"
        );

        let err = Error::CyclicStructure {
            path: "/a/a/a".into(),
            depth: 2,
        };
        assert_eq!(
            err.to_string(),
            "structure at '/a/a/a' nests deeper than 2 levels (cyclic input?)"
        );
    }

    #[test]
    fn error_path() {
        let err = Error::AmbiguousContainerKind {
            path: "/a".into(),
            reason: "mixed".into(),
        };
        assert_eq!(err.path(), Some("/a"));
        assert_eq!(Error::UnknownRule("nope".into()).path(), None);
    }
}
