//! Server frame builders.
//!
//! Each builder returns the JSON text a server would send, ready to feed
//! into a mock transport.

use livesync_codec::{Path, Value};
use livesync_protocol::{Notification, Response, ServerMessage, Signal};

fn encode(message: &ServerMessage) -> String {
    message.encode().expect("server message encodes")
}

/// A `ping` frame carrying a sequence number.
pub fn ping(seq: i64) -> String {
    encode(&ServerMessage::Ping(
        Value::empty_map().with("type", "ping").with("seq", seq),
    ))
}

/// A successful response to `request_id`.
pub fn response(request_id: u64, value: Value) -> String {
    encode(&ServerMessage::Response(Response::ok(request_id, value)))
}

/// An error response to `request_id`.
pub fn error_response(request_id: u64, error: Value) -> String {
    encode(&ServerMessage::Response(Response::error(request_id, error)))
}

/// An `authenticationError` frame.
pub fn auth_error() -> String {
    encode(&ServerMessage::AuthenticationError(
        Value::empty_map().with("reason", "expired"),
    ))
}

/// A `notify` frame with raw signal arguments.
pub fn notify(what: impl Into<Path>, signal: &str, args: Value) -> String {
    encode(&ServerMessage::Notify(Notification::new(what, signal, args)))
}

/// A `notify` frame for a typed signal.
pub fn notify_signal(what: impl Into<Path>, signal: &Signal) -> String {
    notify(what, signal.name().as_str(), signal.to_args())
}

/// A `set` notification.
pub fn notify_set(what: impl Into<Path>, value: Value) -> String {
    notify_signal(what, &Signal::Set(value))
}

/// A `push` notification.
pub fn notify_push(what: impl Into<Path>, element: Value) -> String {
    notify_signal(what, &Signal::Push(element))
}

/// A document `{key: id}` used as a keyed list element.
pub fn keyed(key: &str, id: i64) -> Value {
    Value::empty_map().with(key, id)
}

/// A keyed element with an extra `label` field.
pub fn labeled(key: &str, id: i64, label: &str) -> Value {
    keyed(key, id).with("label", label)
}
