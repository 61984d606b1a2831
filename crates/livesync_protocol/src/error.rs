//! Error types for the protocol crate.

use livesync_codec::CodecError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting wire messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text could not be parsed or serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Top-level `type` is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field has the wrong kind of value.
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What the field should have been.
        expected: &'static str,
    },

    /// Signal name is outside the supported vocabulary.
    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    /// Signal arguments do not match the signal's shape.
    #[error("invalid arguments for signal `{signal}`: {message}")]
    InvalidSignalArgs {
        /// Signal name.
        signal: String,
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Creates an invalid signal arguments error.
    pub fn invalid_args(signal: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSignalArgs {
            signal: signal.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error means the peer speaks a different
    /// protocol version, as opposed to a single malformed frame.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, ProtocolError::UnknownMessageType(_))
    }
}
