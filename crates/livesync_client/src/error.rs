//! Error types for the client.

use crate::observable::ProjectionKind;
use livesync_codec::{CodecError, Value};
use livesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Outcome delivered to the caller of a request.
pub type RequestResult = Result<Value, RequestError>;

/// Why a request did not produce a response value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The server answered with an error payload.
    #[error("remote error: {0}")]
    Remote(Value),

    /// The connection dropped and the request was not allowed to wait
    /// for a reconnect.
    #[error("disconnected before a response arrived")]
    Disconnected,

    /// The deadline passed before a response arrived.
    #[error("request timed out")]
    Timeout,
}

impl RequestError {
    /// Returns the server's error payload, if this is a remote error.
    pub fn remote_payload(&self) -> Option<&Value> {
        match self {
            RequestError::Remote(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Errors raised by the connection, its transports and projections.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server sent a frame this client does not understand.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A document could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A projection received a signal it cannot apply.
    #[error("signal `{signal}` is not supported by {kind} projections")]
    UnsupportedSignal {
        /// Signal name as received.
        signal: String,
        /// Kind of the projection.
        kind: ProjectionKind,
    },

    /// A request result was set twice.
    #[error("request {0} was already resolved")]
    AlreadyResolved(u64),

    /// The server rejected the session.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The connection has been shut down.
    #[error("connection shut down")]
    Shutdown,
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an unsupported signal error.
    pub fn unsupported_signal(signal: impl Into<String>, kind: ProjectionKind) -> Self {
        Self::UnsupportedSignal {
            signal: signal.into(),
            kind,
        }
    }

    /// Returns true if reconnecting may clear this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection refused").is_retryable());
        assert!(!ClientError::transport_fatal("bad url").is_retryable());
        assert!(!ClientError::AuthenticationFailed.is_retryable());
        assert!(!ClientError::Shutdown.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ClientError::unsupported_signal("push", ProjectionKind::Value);
        assert_eq!(
            err.to_string(),
            "signal `push` is not supported by value projections"
        );

        let err = RequestError::Remote(Value::from("denied"));
        assert_eq!(err.to_string(), r#"remote error: "denied""#);
        assert_eq!(err.remote_payload(), Some(&Value::from("denied")));
        assert_eq!(RequestError::Timeout.remote_payload(), None);
    }

    #[test]
    fn protocol_errors_convert() {
        let err: ClientError = ProtocolError::UnknownMessageType("x".into()).into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
