//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during parsing or serialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Text is not a valid JSON document.
    #[error("parse failed at line {line}, column {column}: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
        /// 1-based line of the error.
        line: usize,
        /// 1-based column of the error.
        column: usize,
    },

    /// Failed to serialize a value.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the serialization error.
        message: String,
    },

    /// Document does not have the expected shape.
    #[error("invalid document structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    /// Create a parse error from a `serde_json` failure.
    pub(crate) fn parse(err: &serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
