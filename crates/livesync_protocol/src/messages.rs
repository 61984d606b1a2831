//! Protocol messages exchanged over a LiveSync connection.
//!
//! Every frame is a single JSON document with a top-level `type` field,
//! except RPC completions, which are identified by `responseId`.

use crate::error::{ProtocolError, ProtocolResult};
use livesync_codec::{from_json, to_json, Path, Value};

const TYPE_INITIALIZE_SESSION: &str = "initializeSession";
const TYPE_GET: &str = "get";
const TYPE_REQUEST: &str = "request";
const TYPE_OBSERVE: &str = "observe";
const TYPE_UNOBSERVE: &str = "unobserve";
const TYPE_PING: &str = "ping";
const TYPE_PONG: &str = "pong";
const TYPE_AUTHENTICATION_ERROR: &str = "authenticationError";
const TYPE_NOTIFY: &str = "notify";
const TYPE_ERROR: &str = "error";

/// A message sent from the client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// First frame on every successful open.
    InitializeSession {
        /// Session identifier chosen by the client.
        session_id: String,
    },
    /// Reads the current value at a path.
    Get {
        /// Path to read.
        what: Path,
        /// Request identifier.
        request_id: u64,
    },
    /// Invokes a server method.
    Request {
        /// Method name.
        method: String,
        /// Method arguments.
        args: Value,
        /// Request identifier.
        request_id: u64,
    },
    /// Subscribes to notifications for a path.
    Observe {
        /// Path to observe.
        what: Path,
    },
    /// Cancels a subscription.
    Unobserve {
        /// Path to stop observing.
        what: Path,
    },
    /// Reply to a server ping.
    ///
    /// Carries the ping document; it is echoed back with its `type`
    /// rewritten.
    Pong(Value),
}

impl ClientMessage {
    /// Builds the reply to a ping document.
    pub fn pong_for(ping: &Value) -> Self {
        ClientMessage::Pong(ping.clone())
    }

    /// Returns the wire `type` of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::InitializeSession { .. } => TYPE_INITIALIZE_SESSION,
            ClientMessage::Get { .. } => TYPE_GET,
            ClientMessage::Request { .. } => TYPE_REQUEST,
            ClientMessage::Observe { .. } => TYPE_OBSERVE,
            ClientMessage::Unobserve { .. } => TYPE_UNOBSERVE,
            ClientMessage::Pong(_) => TYPE_PONG,
        }
    }

    /// Returns the request id carried by this message, if any.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientMessage::Get { request_id, .. } | ClientMessage::Request { request_id, .. } => {
                Some(*request_id)
            }
            _ => None,
        }
    }

    /// Converts to a wire document.
    pub fn to_document(&self) -> Value {
        match self {
            ClientMessage::InitializeSession { session_id } => Value::empty_map()
                .with("type", TYPE_INITIALIZE_SESSION)
                .with("sessionId", session_id.as_str()),
            ClientMessage::Get { what, request_id } => Value::empty_map()
                .with("type", TYPE_GET)
                .with("what", what.clone())
                .with("requestId", *request_id),
            ClientMessage::Request {
                method,
                args,
                request_id,
            } => Value::empty_map()
                .with("type", TYPE_REQUEST)
                .with("method", method.as_str())
                .with("args", args.clone())
                .with("requestId", *request_id),
            ClientMessage::Observe { what } => Value::empty_map()
                .with("type", TYPE_OBSERVE)
                .with("what", what.clone())
                .with("pushed", false),
            ClientMessage::Unobserve { what } => Value::empty_map()
                .with("type", TYPE_UNOBSERVE)
                .with("what", what.clone())
                .with("pushed", false),
            ClientMessage::Pong(ping) => {
                let mut doc = if ping.as_map().is_some() {
                    ping.clone()
                } else {
                    Value::empty_map()
                };
                doc.insert("type", Value::from(TYPE_PONG));
                doc
            }
        }
    }

    /// Encodes to JSON text.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(to_json(&self.to_document())?)
    }

    /// Interprets a wire document as a client message.
    pub fn from_document(doc: Value) -> ProtocolResult<Self> {
        let kind = message_type(&doc)?;
        match kind {
            TYPE_INITIALIZE_SESSION => Ok(ClientMessage::InitializeSession {
                session_id: required_text(&doc, "sessionId")?.to_string(),
            }),
            TYPE_GET => Ok(ClientMessage::Get {
                what: required(&doc, "what")?.clone().into(),
                request_id: required_id(&doc, "requestId")?,
            }),
            TYPE_REQUEST => Ok(ClientMessage::Request {
                method: required_text(&doc, "method")?.to_string(),
                args: doc.field("args").clone(),
                request_id: required_id(&doc, "requestId")?,
            }),
            TYPE_OBSERVE => Ok(ClientMessage::Observe {
                what: required(&doc, "what")?.clone().into(),
            }),
            TYPE_UNOBSERVE => Ok(ClientMessage::Unobserve {
                what: required(&doc, "what")?.clone().into(),
            }),
            TYPE_PONG => Ok(ClientMessage::Pong(doc)),
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }

    /// Decodes from JSON text.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Self::from_document(from_json(text)?)
    }
}

/// Completion of an RPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered.
    pub response_id: u64,
    /// `Ok(response)` on success, `Err(error)` for a server-side error.
    ///
    /// Absent payloads are represented as null.
    pub outcome: Result<Value, Value>,
}

impl Response {
    /// Creates a successful response.
    pub fn ok(response_id: u64, response: Value) -> Self {
        Self {
            response_id,
            outcome: Ok(response),
        }
    }

    /// Creates an error response.
    pub fn error(response_id: u64, error: Value) -> Self {
        Self {
            response_id,
            outcome: Err(error),
        }
    }

    /// Returns true if the server reported an error.
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }
}

/// A subscription update for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Path the update applies to.
    pub what: Path,
    /// Signal name, e.g. `set` or `putByKey`.
    pub signal: String,
    /// Positional signal arguments.
    pub args: Value,
}

impl Notification {
    /// Creates a new notification.
    pub fn new(what: impl Into<Path>, signal: impl Into<String>, args: Value) -> Self {
        Self {
            what: what.into(),
            signal: signal.into(),
            args,
        }
    }
}

/// A message sent from the server to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Keep-alive probe; carries the full document so it can be echoed.
    Ping(Value),
    /// Reply to a client ping.
    Pong,
    /// The session was rejected.
    AuthenticationError(Value),
    /// Completion of an RPC.
    Response(Response),
    /// Subscription update.
    Notify(Notification),
}

impl ServerMessage {
    /// Returns a short name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Ping(_) => TYPE_PING,
            ServerMessage::Pong => TYPE_PONG,
            ServerMessage::AuthenticationError(_) => TYPE_AUTHENTICATION_ERROR,
            ServerMessage::Response(_) => "response",
            ServerMessage::Notify(_) => TYPE_NOTIFY,
        }
    }

    /// Interprets a wire document as a server message.
    ///
    /// A document carrying `responseId` is an RPC completion regardless
    /// of its `type`. Any other document must have a known `type`.
    pub fn from_document(doc: Value) -> ProtocolResult<Self> {
        if let Some(id) = doc.get("responseId") {
            let response_id = id.as_integer().and_then(|n| u64::try_from(n).ok()).ok_or(
                ProtocolError::InvalidField {
                    field: "responseId",
                    expected: "a non-negative integer",
                },
            )?;
            let is_error = doc.get("type").and_then(Value::as_text) == Some(TYPE_ERROR)
                || doc.get("error").is_some_and(|error| !error.is_null());
            let outcome = if is_error {
                Err(doc.field("error").clone())
            } else {
                Ok(doc.field("response").clone())
            };
            return Ok(ServerMessage::Response(Response {
                response_id,
                outcome,
            }));
        }

        match message_type(&doc)? {
            TYPE_PING => Ok(ServerMessage::Ping(doc)),
            TYPE_PONG => Ok(ServerMessage::Pong),
            TYPE_AUTHENTICATION_ERROR => Ok(ServerMessage::AuthenticationError(doc)),
            TYPE_NOTIFY => {
                let what = required(&doc, "what")?.clone().into();
                let signal = required_text(&doc, "signal")?.to_string();
                let args = doc.field("args").clone();
                Ok(ServerMessage::Notify(Notification { what, signal, args }))
            }
            other => Err(ProtocolError::UnknownMessageType(other.to_string())),
        }
    }

    /// Decodes from JSON text.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Self::from_document(from_json(text)?)
    }

    /// Converts to a wire document.
    pub fn to_document(&self) -> Value {
        match self {
            ServerMessage::Ping(doc) => {
                let mut doc = doc.clone();
                doc.insert("type", Value::from(TYPE_PING));
                doc
            }
            ServerMessage::Pong => Value::empty_map().with("type", TYPE_PONG),
            ServerMessage::AuthenticationError(doc) => {
                let mut doc = doc.clone();
                doc.insert("type", Value::from(TYPE_AUTHENTICATION_ERROR));
                doc
            }
            ServerMessage::Response(response) => match &response.outcome {
                Ok(value) => Value::empty_map()
                    .with("responseId", response.response_id)
                    .with("response", value.clone()),
                Err(error) => Value::empty_map()
                    .with("responseId", response.response_id)
                    .with("type", TYPE_ERROR)
                    .with("error", error.clone()),
            },
            ServerMessage::Notify(n) => Value::empty_map()
                .with("type", TYPE_NOTIFY)
                .with("what", n.what.clone())
                .with("signal", n.signal.as_str())
                .with("args", n.args.clone()),
        }
    }

    /// Encodes to JSON text.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(to_json(&self.to_document())?)
    }
}

fn message_type(doc: &Value) -> ProtocolResult<&str> {
    match doc.get("type") {
        Some(Value::Text(kind)) => Ok(kind),
        Some(_) => Err(ProtocolError::InvalidField {
            field: "type",
            expected: "a string",
        }),
        None => Err(ProtocolError::MissingField("type")),
    }
}

fn required<'a>(doc: &'a Value, field: &'static str) -> ProtocolResult<&'a Value> {
    doc.get(field).ok_or(ProtocolError::MissingField(field))
}

fn required_text<'a>(doc: &'a Value, field: &'static str) -> ProtocolResult<&'a str> {
    required(doc, field)?
        .as_text()
        .ok_or(ProtocolError::InvalidField {
            field,
            expected: "a string",
        })
}

fn required_id(doc: &Value, field: &'static str) -> ProtocolResult<u64> {
    required(doc, field)?
        .as_integer()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or(ProtocolError::InvalidField {
            field,
            expected: "a non-negative integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_document_shape() {
        let msg = ClientMessage::Request {
            method: "chat.send".into(),
            args: Value::from(vec!["hello"]),
            request_id: 7,
        };
        assert_eq!(
            msg.encode().unwrap(),
            r#"{"type":"request","method":"chat.send","args":["hello"],"requestId":7}"#
        );
        assert_eq!(msg.request_id(), Some(7));
    }

    #[test]
    fn observe_documents_are_not_pushed() {
        let path = Path::from_segments(["users", "online"]);
        let observe = ClientMessage::Observe { what: path.clone() };
        let unobserve = ClientMessage::Unobserve { what: path };
        assert_eq!(
            observe.encode().unwrap(),
            r#"{"type":"observe","what":["users","online"],"pushed":false}"#
        );
        assert_eq!(
            unobserve.encode().unwrap(),
            r#"{"type":"unobserve","what":["users","online"],"pushed":false}"#
        );
    }

    #[test]
    fn client_messages_decode_from_their_text() {
        let messages = vec![
            ClientMessage::InitializeSession {
                session_id: "abc".into(),
            },
            ClientMessage::Get {
                what: Path::from("status"),
                request_id: 1,
            },
            ClientMessage::Observe {
                what: Path::from("status"),
            },
        ];
        for msg in messages {
            let text = msg.encode().unwrap();
            assert_eq!(ClientMessage::decode(&text).unwrap(), msg);
        }
    }

    #[test]
    fn pong_echoes_ping_fields() {
        let ping = ServerMessage::decode(r#"{"type":"ping","at":1234}"#).unwrap();
        let ServerMessage::Ping(doc) = ping else {
            panic!("expected ping");
        };
        let pong = ClientMessage::pong_for(&doc);
        assert_eq!(pong.encode().unwrap(), r#"{"type":"pong","at":1234}"#);
    }

    #[test]
    fn response_without_payload_is_null() {
        let msg = ServerMessage::decode(r#"{"responseId":3}"#).unwrap();
        assert_eq!(msg, ServerMessage::Response(Response::ok(3, Value::Null)));
    }

    #[test]
    fn error_response_carries_payload() {
        let msg =
            ServerMessage::decode(r#"{"responseId":4,"type":"error","error":{"code":"notFound"}}"#)
                .unwrap();
        let ServerMessage::Response(response) = msg else {
            panic!("expected response");
        };
        assert!(response.is_error());
        assert_eq!(
            response.outcome,
            Err(Value::empty_map().with("code", "notFound"))
        );
    }

    #[test]
    fn error_type_without_payload_is_null_error() {
        let msg = ServerMessage::decode(r#"{"responseId":5,"type":"error"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Response(Response::error(5, Value::Null)));
    }

    #[test]
    fn null_error_field_is_not_an_error() {
        let msg = ServerMessage::decode(r#"{"responseId":1,"response":5,"error":null}"#).unwrap();
        assert_eq!(msg, ServerMessage::Response(Response::ok(1, Value::from(5))));
    }

    #[test]
    fn notify_decodes_path_and_args() {
        let msg = ServerMessage::decode(
            r#"{"type":"notify","what":["todo",1],"signal":"push","args":[{"id":2}]}"#,
        )
        .unwrap();
        let ServerMessage::Notify(n) = msg else {
            panic!("expected notify");
        };
        assert_eq!(n.what, Path::from(vec![Value::from("todo"), Value::from(1)]));
        assert_eq!(n.signal, "push");
        assert_eq!(n.args.at(0).field("id"), &Value::Integer(2));
    }

    #[test]
    fn server_messages_encode_to_decodable_text() {
        let messages = vec![
            ServerMessage::Pong,
            ServerMessage::Response(Response::ok(9, Value::from("done"))),
            ServerMessage::Response(Response::error(10, Value::from("denied"))),
            ServerMessage::Notify(Notification::new("status", "set", Value::from(vec![1]))),
        ];
        for msg in messages {
            let text = msg.encode().unwrap();
            assert_eq!(ServerMessage::decode(&text).unwrap(), msg);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = ServerMessage::decode(r#"{"type":"teleport"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownMessageType("teleport".into()));
        assert!(err.is_version_mismatch());
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = ServerMessage::decode(r#"{"hello":"world"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingField("type"));
    }

    #[test]
    fn negative_response_id_is_rejected() {
        let err = ServerMessage::decode(r#"{"responseId":-1}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidField {
                field: "responseId",
                ..
            }
        ));
    }

    #[test]
    fn garbage_text_is_a_codec_error() {
        let err = ServerMessage::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Codec(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decoding_arbitrary_text_never_panics(text in ".{0,64}") {
                let _ = ServerMessage::decode(&text);
                let _ = ClientMessage::decode(&text);
            }

            #[test]
            fn response_id_wins_over_type(id in 0u64..1_000_000, kind in "[a-z]{1,10}") {
                let doc = Value::empty_map()
                    .with("type", kind.as_str())
                    .with("responseId", id);
                match ServerMessage::from_document(doc).unwrap() {
                    ServerMessage::Response(response) => {
                        prop_assert_eq!(response.response_id, id);
                        prop_assert_eq!(response.is_error(), kind == "error");
                    }
                    other => prop_assert!(false, "unexpected message {:?}", other),
                }
            }
        }
    }
}
