//! Transport layer abstraction.
//!
//! A transport moves whole text frames between the client and the server.
//! The connection owns it exclusively and hands it a [`TransportEvents`]
//! on every open; the transport reports what happens on the wire through
//! that handle.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::connection::Shared;
use crate::error::{ClientError, ClientResult};
use livesync_codec::{from_json, Value};
use livesync_protocol::{ClientMessage, ServerMessage};
use parking_lot::Mutex;

/// Wire state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Opening has been requested.
    Connecting,
    /// Frames can be sent.
    Open,
    /// No socket.
    Closed,
}

/// A duplex, message-oriented link to the server.
///
/// Implementations must not invoke `events` synchronously from inside
/// [`Transport::send`]; the connection may be holding its lock there.
pub trait Transport: Send + Sync {
    /// Starts opening the link. Progress is reported through `events`.
    fn open(&self, events: TransportEvents) -> ClientResult<()>;

    /// Sends one text frame.
    fn send(&self, text: &str) -> ClientResult<()>;

    /// Closes the link. A close event follows if the link was not closed.
    fn close(&self);

    /// Current wire state.
    fn state(&self) -> TransportState;
}

/// Callback handle a transport uses to report wire events.
///
/// Holds only a weak reference to the connection; events arriving after
/// the connection is gone are ignored.
#[derive(Clone)]
pub struct TransportEvents {
    connection: Weak<Shared>,
}

impl TransportEvents {
    pub(crate) fn new(connection: Weak<Shared>) -> Self {
        Self { connection }
    }

    /// The link is open.
    pub fn on_open(&self) {
        if let Some(shared) = self.connection.upgrade() {
            shared.handle_open();
        }
    }

    /// A text frame arrived.
    ///
    /// Returns the error that made the connection drop the frame, if any.
    pub fn on_message(&self, text: &str) -> ClientResult<()> {
        match self.connection.upgrade() {
            Some(shared) => shared.handle_message(text),
            None => Err(ClientError::Shutdown),
        }
    }

    /// The link closed.
    pub fn on_close(&self, code: u16, reason: &str, clean: bool) {
        if let Some(shared) = self.connection.upgrade() {
            shared.handle_close(code, reason, clean);
        }
    }

    /// Returns true while the connection still exists.
    pub fn is_alive(&self) -> bool {
        self.connection.strong_count() > 0
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[derive(Debug)]
struct MockState {
    state: TransportState,
    events: Option<TransportEvents>,
    sent: Vec<String>,
    opens: usize,
    fail_next_open: Option<String>,
}

/// An in-memory transport for testing.
///
/// Clones share state, so a test keeps one clone to drive events while
/// the connection owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a closed mock transport.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                state: TransportState::Closed,
                events: None,
                sent: Vec::new(),
                opens: 0,
                fail_next_open: None,
            })),
        }
    }

    /// Makes the next `open` call fail.
    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.inner.lock().fail_next_open = Some(message.into());
    }

    /// Number of times `open` was called successfully.
    pub fn open_count(&self) -> usize {
        self.inner.lock().opens
    }

    /// Frames sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    /// Frames sent so far, clearing the record.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().sent)
    }

    /// Frames sent so far, parsed as documents.
    pub fn sent_documents(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|text| from_json(text).ok())
            .collect()
    }

    /// Frames sent so far, decoded as client messages.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent()
            .iter()
            .filter_map(|text| ClientMessage::decode(text).ok())
            .collect()
    }

    /// Completes a pending open.
    pub fn simulate_open(&self) {
        let events = {
            let mut inner = self.inner.lock();
            inner.state = TransportState::Open;
            inner.events.clone()
        };
        if let Some(events) = events {
            events.on_open();
        }
    }

    /// Delivers a text frame from the server.
    pub fn simulate_message(&self, text: &str) -> ClientResult<()> {
        let events = self.inner.lock().events.clone();
        match events {
            Some(events) => events.on_message(text),
            None => Err(ClientError::transport_fatal("mock transport was never opened")),
        }
    }

    /// Delivers a server message.
    pub fn receive(&self, message: &ServerMessage) -> ClientResult<()> {
        let text = message.encode()?;
        self.simulate_message(&text)
    }

    /// Drops the link as if the network failed.
    pub fn simulate_drop(&self) {
        self.finish_close(1006, "connection lost", false);
    }

    fn finish_close(&self, code: u16, reason: &str, clean: bool) {
        let events = {
            let mut inner = self.inner.lock();
            if inner.state == TransportState::Closed {
                return;
            }
            inner.state = TransportState::Closed;
            inner.events.clone()
        };
        if let Some(events) = events {
            events.on_close(code, reason, clean);
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn open(&self, events: TransportEvents) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_next_open.take() {
            return Err(ClientError::transport_retryable(message));
        }
        inner.state = TransportState::Connecting;
        inner.events = Some(events);
        inner.opens += 1;
        Ok(())
    }

    fn send(&self, text: &str) -> ClientResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != TransportState::Open {
            return Err(ClientError::transport_retryable("mock transport is not open"));
        }
        inner.sent.push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.finish_close(1000, "closed by client", true);
    }

    fn state(&self) -> TransportState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_transport_refuses_sends_until_open() {
        let transport = MockTransport::new();
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(transport.send("{}").is_err());

        transport.open(TransportEvents::new(Weak::new())).unwrap();
        assert_eq!(transport.state(), TransportState::Connecting);
        assert!(transport.send("{}").is_err());

        transport.simulate_open();
        assert_eq!(transport.state(), TransportState::Open);
        transport.send(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(transport.sent(), vec![r#"{"type":"pong"}"#.to_string()]);
        assert_eq!(
            transport.sent_messages(),
            vec![ClientMessage::Pong(Value::empty_map().with("type", "pong"))]
        );
        assert_eq!(transport.take_sent().len(), 1);
        assert!(transport.sent().is_empty());

        transport.close();
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[test]
    fn mock_transport_open_failure() {
        let transport = MockTransport::new();
        transport.fail_next_open("refused");
        let err = transport
            .open(TransportEvents::new(Weak::new()))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.open_count(), 0);

        transport.open(TransportEvents::new(Weak::new())).unwrap();
        assert_eq!(transport.open_count(), 1);
    }

    #[test]
    fn events_without_connection_are_ignored() {
        let events = TransportEvents::new(Weak::new());
        assert!(!events.is_alive());
        events.on_open();
        events.on_close(1000, "bye", true);
        assert!(matches!(events.on_message("{}"), Err(ClientError::Shutdown)));
    }
}
