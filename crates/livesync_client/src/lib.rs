//! # LiveSync Client
//!
//! Client engine for the LiveSync duplex protocol.
//!
//! This crate provides:
//! - A connection state machine over a pluggable transport
//! - Request/response calls with per-request timeouts and reconnect queueing
//! - Path observations with reference-counted server subscriptions
//! - Replay of received notifications to late subscribers
//! - Scalar and keyed-list projections that apply server signals locally
//!
//! ## Architecture
//!
//! A [`Connection`] owns one [`Transport`] and all bookkeeping for it.
//! Each observed path has one [`Observation`] that fans notifications
//! out to its projections ([`ObservableValue`], [`ObservableList`]).
//! Projections hold no strong reference back to the observation; when the
//! last one is disposed or dropped the path is unobserved.
//!
//! ## Key Invariants
//!
//! - Request ids are unique per connection and never reused
//! - Every request is settled exactly once
//! - A path is observed at most once per open link
//! - A new link starts with an empty replay log
//!
//! ## Example
//!
//! ```
//! use livesync_client::{Connection, ConnectionConfig, MockTransport, Value};
//!
//! let transport = MockTransport::new();
//! let connection = Connection::new(ConnectionConfig::new("mock://"), transport.clone()).unwrap();
//! connection.connect().unwrap();
//! transport.simulate_open();
//!
//! let pending = connection.request("echo", Value::from(vec!["hi"]));
//! transport
//!     .simulate_message(r#"{"type":"response","responseId":1,"response":"hi"}"#)
//!     .unwrap();
//! assert_eq!(pending.wait(), Ok(Value::from("hi")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod observable;
mod observation;
mod projection;
mod request;
mod scheduler;
mod transport;
#[cfg(feature = "websocket")]
mod websocket;

pub use config::{ConnectionConfig, RequestPolicy, DEFAULT_SENT_TIMEOUT, DEFAULT_TIMEOUT};
pub use connection::{CloseEvent, Connection, ConnectionStats, ConnectionStatus};
pub use error::{ClientError, ClientResult, RequestError, RequestResult};
pub use observable::{
    AnyProjection, Lifecycle, ObserverId, Projection, ProjectionHandle, ProjectionKind,
};
pub use observation::Observation;
pub use projection::{ObservableList, ObservableValue};
pub use request::{ResponseFuture, ResultSlot};
pub use transport::{MockTransport, Transport, TransportEvents, TransportState};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

pub use livesync_codec::{Path, Value};
pub use livesync_protocol::{ClientMessage, Notification};
