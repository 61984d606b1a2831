//! Connection state machine.
//!
//! A [`Connection`] multiplexes request/response calls and path
//! observations over one transport. All of its bookkeeping (request
//! lists, id counter, observation table, status) lives behind a single
//! mutex. That lock is a leaf: nothing calls into an observation, a
//! projection, or a result slot while holding it. Only the transport's
//! `send` runs under it.
//!
//! ## States
//!
//! ```text
//! Disconnected --connect()--> Connecting --on_open--> Open
//!      ^                                               |
//!      +-------------------on_close--------------------+
//! ```
//!
//! The connection never reconnects on its own; call
//! [`Connection::connect`] again after a close.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::config::{ConnectionConfig, RequestPolicy};
use crate::error::{ClientError, ClientResult, RequestError};
use crate::observable::ProjectionHandle;
use crate::observation::Observation;
use crate::projection::{ObservableList, ObservableValue};
use crate::request::{Request, ResponseFuture};
use crate::scheduler;
use crate::transport::{Transport, TransportEvents};
use livesync_codec::{to_json, Path, Value};
use livesync_protocol::{ClientMessage, Notification, Response, ServerMessage};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport link.
    Disconnected,
    /// The transport is opening.
    Connecting,
    /// The transport is open and the session initialized.
    Open,
}

impl ConnectionStatus {
    /// Returns true if requests are sent immediately.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionStatus::Open)
    }
}

/// How the last transport link ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code reported by the transport.
    pub code: u16,
    /// Close reason reported by the transport.
    pub reason: String,
    /// Whether the close handshake completed.
    pub clean: bool,
}

/// Counters describing a connection's traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Successful opens.
    pub opens: u64,
    /// Transport closes.
    pub closes: u64,
    /// Request frames written to the transport.
    pub requests_sent: u64,
    /// Responses matched to a waiting request.
    pub responses: u64,
    /// Requests failed by their deadline.
    pub timeouts: u64,
    /// Requests failed because the connection dropped.
    pub disconnect_rejections: u64,
    /// Sent requests moved back to the queue by a disconnect.
    pub requeued: u64,
    /// Notifications delivered to an observation.
    pub notifications: u64,
    /// Notifications for paths nobody observes.
    pub dropped_notifications: u64,
    /// The most recent close.
    pub last_close: Option<CloseEvent>,
}

pub(crate) struct ConnectionState {
    pub(crate) status: ConnectionStatus,
    pub(crate) epoch: u64,
    pub(crate) shutdown: bool,
    next_request_id: u64,
    waiting: Vec<Request>,
    queued: VecDeque<Request>,
    observations: BTreeMap<Path, Arc<Observation>>,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            epoch: 0,
            shutdown: false,
            next_request_id: 1,
            waiting: Vec::new(),
            queued: VecDeque::new(),
            observations: BTreeMap::new(),
        }
    }

    /// Removes every request whose deadline has passed.
    pub(crate) fn take_expired(&mut self, now: Instant) -> Vec<Request> {
        let mut expired = Vec::new();

        let mut index = 0;
        while index < self.waiting.len() {
            if self.waiting[index].is_expired(now) {
                expired.push(self.waiting.remove(index));
            } else {
                index += 1;
            }
        }

        let mut index = 0;
        while index < self.queued.len() {
            if self.queued[index].is_expired(now) {
                if let Some(request) = self.queued.remove(index) {
                    expired.push(request);
                }
            } else {
                index += 1;
            }
        }

        expired
    }

    /// Earliest deadline among pending requests.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.waiting
            .iter()
            .chain(self.queued.iter())
            .filter_map(|request| request.deadline)
            .min()
    }
}

pub(crate) struct Shared {
    config: ConnectionConfig,
    transport: Box<dyn Transport>,
    pub(crate) state: Mutex<ConnectionState>,
    pub(crate) wakeup: Condvar,
    stats: RwLock<ConnectionStats>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    /// Serializes and writes one document.
    fn transmit(&self, document: &Value) -> bool {
        let text = match to_json(document) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode outgoing message");
                return false;
            }
        };
        match self.transport.send(&text) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to send message");
                false
            }
        }
    }

    fn transmit_message(&self, message: &ClientMessage) -> bool {
        self.transmit(&message.to_document())
    }

    fn transmit_request(&self, request: &Request) {
        if self.transmit(&request.message) {
            self.stats.write().requests_sent += 1;
            trace!(request_id = request.id, "request sent");
        }
    }

    fn connect(self: &Arc<Self>) -> ClientResult<()> {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return Err(ClientError::Shutdown);
            }
            if state.status != ConnectionStatus::Disconnected {
                return Ok(());
            }
            state.status = ConnectionStatus::Connecting;
        }

        debug!(url = %self.config.url, "connecting");
        let events = TransportEvents::new(Arc::downgrade(self));
        if let Err(e) = self.transport.open(events) {
            let mut state = self.state.lock();
            if state.status == ConnectionStatus::Connecting {
                state.status = ConnectionStatus::Disconnected;
            }
            warn!(url = %self.config.url, error = %e, "transport refused to open");
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn handle_open(&self) {
        let (epoch, observations) = {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.epoch += 1;
            state.status = ConnectionStatus::Open;
            self.transmit_message(&ClientMessage::InitializeSession {
                session_id: self.config.session_id.clone(),
            });
            let observations: Vec<Arc<Observation>> =
                state.observations.values().cloned().collect();
            (state.epoch, observations)
        };
        self.stats.write().opens += 1;
        info!(epoch, url = %self.config.url, "connection open");

        for observation in &observations {
            observation.handle_connect(epoch);
        }

        let flushed = {
            let mut state = self.state.lock();
            if state.status != ConnectionStatus::Open || state.epoch != epoch {
                return;
            }
            let mut flushed = 0;
            while let Some(request) = state.queued.pop_front() {
                self.transmit_request(&request);
                state.waiting.push(request);
                flushed += 1;
            }
            flushed
        };
        if flushed > 0 {
            self.wakeup.notify_all();
            debug!(epoch, flushed, "queued requests sent");
        }
    }

    pub(crate) fn handle_message(&self, text: &str) -> ClientResult<()> {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "protocol violation, closing transport");
                self.transport.close();
                return Err(e.into());
            }
        };
        trace!(kind = message.type_name(), "message received");

        match message {
            ServerMessage::Ping(ping) => {
                self.transmit_message(&ClientMessage::pong_for(&ping));
                Ok(())
            }
            ServerMessage::Pong => Ok(()),
            ServerMessage::AuthenticationError(_) => {
                warn!(url = %self.config.url, "authentication rejected, closing transport");
                self.transport.close();
                Err(ClientError::AuthenticationFailed)
            }
            ServerMessage::Response(response) => {
                self.complete(response);
                Ok(())
            }
            ServerMessage::Notify(notification) => {
                self.dispatch(&notification);
                Ok(())
            }
        }
    }

    fn complete(&self, response: Response) {
        let request = {
            let mut state = self.state.lock();
            let position = state
                .waiting
                .iter()
                .position(|request| request.id == response.response_id);
            position.map(|index| state.waiting.remove(index))
        };

        let Some(request) = request else {
            trace!(
                request_id = response.response_id,
                "discarding response for unknown request"
            );
            return;
        };
        self.wakeup.notify_all();
        self.stats.write().responses += 1;
        debug!(
            request_id = request.id,
            error = response.is_error(),
            elapsed_ms = request.created_at.elapsed().as_millis() as u64,
            "response received"
        );
        request.settle(response.outcome.map_err(RequestError::Remote));
    }

    fn dispatch(&self, notification: &Notification) {
        let target = {
            let state = self.state.lock();
            state
                .observations
                .get(&notification.what)
                .cloned()
                .map(|observation| (observation, state.epoch))
        };

        let delivered = match target {
            Some((observation, epoch)) => observation.handle_notify(notification, epoch),
            None => false,
        };

        let mut stats = self.stats.write();
        if delivered {
            stats.notifications += 1;
        } else {
            stats.dropped_notifications += 1;
            trace!(path = %notification.what, "dropping notification for unobserved path");
        }
    }

    pub(crate) fn handle_close(&self, code: u16, reason: &str, clean: bool) {
        let now = Instant::now();
        let (rejected, requeued, observations) = {
            let mut state = self.state.lock();
            state.status = ConnectionStatus::Disconnected;

            let mut rejected = Vec::new();
            let mut kept = VecDeque::new();
            for mut request in std::mem::take(&mut state.waiting) {
                if request.policy.queue_when_disconnected {
                    request.requeue(now);
                    kept.push_back(request);
                } else {
                    rejected.push(request);
                }
            }
            let requeued = kept.len() as u64;

            for request in std::mem::take(&mut state.queued) {
                if request.policy.queue_when_disconnected {
                    kept.push_back(request);
                } else {
                    rejected.push(request);
                }
            }
            state.queued = kept;

            let observations: Vec<Arc<Observation>> =
                state.observations.values().cloned().collect();
            (rejected, requeued, observations)
        };
        self.wakeup.notify_all();

        {
            let mut stats = self.stats.write();
            stats.closes += 1;
            stats.requeued += requeued;
            stats.disconnect_rejections += rejected.len() as u64;
            stats.last_close = Some(CloseEvent {
                code,
                reason: reason.to_string(),
                clean,
            });
        }
        info!(
            code,
            reason,
            clean,
            rejected = rejected.len(),
            requeued,
            "connection closed"
        );

        for request in rejected {
            request.settle(Err(RequestError::Disconnected));
        }
        for observation in &observations {
            observation.handle_disconnect();
        }
    }

    fn enqueue(
        &self,
        policy: RequestPolicy,
        build: impl FnOnce(u64) -> ClientMessage,
    ) -> ResponseFuture {
        let now = Instant::now();
        let (future, rejected) = {
            let mut state = self.state.lock();
            let id = state.next_request_id;
            state.next_request_id += 1;
            let (request, future) = Request::new(id, build(id).to_document(), policy, now);

            let rejected = if state.shutdown {
                Some(request)
            } else if state.status.is_open() && state.queued.is_empty() {
                self.transmit_request(&request);
                state.waiting.push(request);
                None
            } else if state.status.is_open() || policy.queue_when_disconnected {
                trace!(request_id = id, "request queued");
                state.queued.push_back(request);
                None
            } else {
                Some(request)
            };
            (future, rejected)
        };
        self.wakeup.notify_all();

        if let Some(request) = rejected {
            self.stats.write().disconnect_rejections += 1;
            debug!(request_id = request.id, "request rejected while disconnected");
            request.settle(Err(RequestError::Disconnected));
        }
        future
    }

    /// Fails requests found expired by the scheduler.
    pub(crate) fn expire(&self, expired: Vec<Request>) {
        self.stats.write().timeouts += expired.len() as u64;
        for request in expired {
            debug!(
                request_id = request.id,
                elapsed_ms = request.created_at.elapsed().as_millis() as u64,
                "request timed out"
            );
            request.settle(Err(RequestError::Timeout));
        }
    }

    /// Returns the registered observation for `path`, or a new one that
    /// joins the table when its first projection attaches.
    pub(crate) fn observation(self: &Arc<Self>, path: Path) -> Arc<Observation> {
        if let Some(existing) = self.find_observation(&path) {
            return existing;
        }
        Arc::new(Observation::new(path, Arc::downgrade(self)))
    }

    /// Puts `observation` in the table.
    ///
    /// Fails with the current entry when another observation already
    /// holds the path.
    pub(crate) fn register(&self, observation: &Arc<Observation>) -> Result<(), Arc<Observation>> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Ok(());
        }
        match state.observations.entry(observation.path().clone()) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), observation) => Ok(()),
            Entry::Occupied(entry) => Err(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(observation));
                Ok(())
            }
        }
    }

    pub(crate) fn find_observation(&self, path: &Path) -> Option<Arc<Observation>> {
        self.state.lock().observations.get(path).cloned()
    }

    /// Sends `observe` unless it was already sent on the current link.
    ///
    /// Returns the epoch the path is now observed in.
    pub(crate) fn observe_once(&self, path: &Path, observed: Option<u64>) -> Option<u64> {
        let state = self.state.lock();
        if state.shutdown || !state.status.is_open() || observed == Some(state.epoch) {
            return None;
        }
        self.transmit_message(&ClientMessage::Observe { what: path.clone() });
        Some(state.epoch)
    }

    /// Unsubscribes a path whose last projection went away and drops it
    /// from the table.
    pub(crate) fn retire(&self, observation: &Observation) {
        let removed = {
            let mut state = self.state.lock();
            if state.status.is_open() {
                self.transmit_message(&ClientMessage::Unobserve {
                    what: observation.path().clone(),
                });
            }
            let registered = state
                .observations
                .get(observation.path())
                .is_some_and(|entry| std::ptr::eq(Arc::as_ptr(entry), observation));
            if registered {
                state.observations.remove(observation.path())
            } else {
                None
            }
        };
        drop(removed);
    }

    fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.wakeup.notify_all();

        if let Some(handle) = self.scheduler.lock().take() {
            if handle.join().is_err() {
                warn!("timeout scheduler panicked");
            }
        }
        self.transport.close();

        let (pending, observations) = {
            let mut state = self.state.lock();
            state.status = ConnectionStatus::Disconnected;
            let mut pending: Vec<Request> = std::mem::take(&mut state.waiting);
            pending.extend(std::mem::take(&mut state.queued));
            (pending, std::mem::take(&mut state.observations))
        };
        for request in pending {
            request.settle(Err(RequestError::Disconnected));
        }
        drop(observations);
        debug!(url = %self.config.url, "connection shut down");
    }
}

/// A client connection to a LiveSync server.
///
/// Dropping the connection stops its timeout scheduler, closes the
/// transport and fails every pending request with
/// [`RequestError::Disconnected`].
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates a disconnected connection over `transport`.
    pub fn new(config: ConnectionConfig, transport: impl Transport + 'static) -> ClientResult<Self> {
        let shared = Arc::new(Shared {
            config,
            transport: Box::new(transport),
            state: Mutex::new(ConnectionState::new()),
            wakeup: Condvar::new(),
            stats: RwLock::new(ConnectionStats::default()),
            scheduler: Mutex::new(None),
        });
        let handle = scheduler::spawn(Arc::downgrade(&shared)).map_err(|e| {
            ClientError::transport_fatal(format!("failed to start timeout scheduler: {e}"))
        })?;
        *shared.scheduler.lock() = Some(handle);
        Ok(Self { shared })
    }

    /// Opens the transport. Does nothing if already open or opening.
    pub fn connect(&self) -> ClientResult<()> {
        self.shared.connect()
    }

    /// Closes the transport. Pending requests follow the disconnect
    /// policy.
    pub fn disconnect(&self) {
        self.shared.transport.close();
    }

    /// Handles a transport open. Normally called through
    /// [`TransportEvents`].
    pub fn handle_open(&self) {
        self.shared.handle_open();
    }

    /// Handles one text frame. Normally called through
    /// [`TransportEvents`].
    ///
    /// A frame that cannot be understood closes the transport and is
    /// reported as [`ClientError::Protocol`].
    pub fn handle_message(&self, text: &str) -> ClientResult<()> {
        self.shared.handle_message(text)
    }

    /// Handles a transport close. Normally called through
    /// [`TransportEvents`].
    pub fn handle_close(&self, code: u16, reason: &str, clean: bool) {
        self.shared.handle_close(code, reason, clean);
    }

    /// Calls a server method with the default policy.
    pub fn request(&self, method: impl Into<String>, args: Value) -> ResponseFuture {
        self.request_with(method, args, self.shared.config.default_policy)
    }

    /// Calls a server method.
    pub fn request_with(
        &self,
        method: impl Into<String>,
        args: Value,
        policy: RequestPolicy,
    ) -> ResponseFuture {
        let method = method.into();
        self.shared
            .enqueue(policy, move |request_id| ClientMessage::Request {
                method,
                args,
                request_id,
            })
    }

    /// Reads the value at a path with the default policy.
    pub fn get(&self, path: impl Into<Path>) -> ResponseFuture {
        self.get_with(path, self.shared.config.default_policy)
    }

    /// Reads the value at a path.
    pub fn get_with(&self, path: impl Into<Path>, policy: RequestPolicy) -> ResponseFuture {
        let what = path.into();
        self.shared
            .enqueue(policy, move |request_id| ClientMessage::Get { what, request_id })
    }

    /// Returns the observation for a path.
    ///
    /// A path with no attached projection gets a fresh observation that
    /// is only kept by the connection once something attaches to it.
    pub fn observation(&self, path: impl Into<Path>) -> Arc<Observation> {
        self.shared.observation(path.into())
    }

    /// Returns the observation for a path if one exists.
    pub fn find_observation(&self, path: &Path) -> Option<Arc<Observation>> {
        self.shared.find_observation(path)
    }

    /// Returns the projection of type `P` for a path.
    pub fn observable<P: ProjectionHandle>(&self, path: impl Into<Path>) -> P {
        self.observation(path).observable::<P>()
    }

    /// Returns the scalar projection for a path.
    pub fn value(&self, path: impl Into<Path>) -> ObservableValue {
        self.observable(path)
    }

    /// Returns the list projection for a path.
    pub fn list(&self, path: impl Into<Path>) -> ObservableList {
        self.observable(path)
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Returns true while the transport is open.
    pub fn is_connected(&self) -> bool {
        self.status().is_open()
    }

    /// Number of successful opens so far.
    pub fn epoch(&self) -> u64 {
        self.shared.state.lock().epoch
    }

    /// Session id sent on every open.
    pub fn session_id(&self) -> &str {
        &self.shared.config.session_id
    }

    /// Server URL.
    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    /// Configuration this connection was created with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Requests sent and awaiting a response.
    pub fn waiting_len(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }

    /// Requests waiting for the connection to open.
    pub fn queued_len(&self) -> usize {
        self.shared.state.lock().queued.len()
    }

    /// Number of observed paths.
    pub fn observation_count(&self) -> usize {
        self.shared.state.lock().observations.len()
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.read().clone()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url())
            .field("status", &self.status())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use livesync_codec::from_json;
    use std::time::Duration;

    fn open_connection() -> (Connection, MockTransport) {
        let transport = MockTransport::new();
        let connection = Connection::new(
            ConnectionConfig::new("mock://").with_session_id("s-1"),
            transport.clone(),
        )
        .unwrap();
        connection.connect().unwrap();
        transport.simulate_open();
        (connection, transport)
    }

    #[test]
    fn open_initializes_session() {
        let (connection, transport) = open_connection();
        assert_eq!(connection.status(), ConnectionStatus::Open);
        assert_eq!(connection.epoch(), 1);
        assert_eq!(
            transport.sent(),
            vec![r#"{"type":"initializeSession","sessionId":"s-1"}"#.to_string()]
        );
    }

    #[test]
    fn connect_is_idempotent() {
        let (connection, transport) = open_connection();
        connection.connect().unwrap();
        assert_eq!(transport.open_count(), 1);
    }

    #[test]
    fn refused_open_returns_to_disconnected() {
        let transport = MockTransport::new();
        transport.fail_next_open("refused");
        let connection = Connection::new(ConnectionConfig::new("mock://"), transport).unwrap();
        assert!(connection.connect().is_err());
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let (connection, transport) = open_connection();
        transport.take_sent();
        connection
            .handle_message(r#"{"type":"ping","seq":4}"#)
            .unwrap();
        assert_eq!(transport.sent(), vec![r#"{"type":"pong","seq":4}"#.to_string()]);

        connection.handle_message(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn request_frames_carry_ids() {
        let (connection, transport) = open_connection();
        transport.take_sent();

        let first = connection.request("echo", Value::from(vec!["a"]));
        let second = connection.get("status");
        assert_eq!(first.request_id(), 1);
        assert_eq!(second.request_id(), 2);
        assert_eq!(
            transport.sent_documents(),
            vec![
                from_json(r#"{"type":"request","method":"echo","args":["a"],"requestId":1}"#)
                    .unwrap(),
                from_json(r#"{"type":"get","what":"status","requestId":2}"#).unwrap(),
            ]
        );
        assert_eq!(connection.waiting_len(), 2);
    }

    #[test]
    fn unknown_message_type_closes_transport() {
        let (connection, transport) = open_connection();
        let err = connection
            .handle_message(r#"{"type":"teleport"}"#)
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(transport.state(), crate::TransportState::Closed);
    }

    #[test]
    fn authentication_error_closes_transport() {
        let (connection, transport) = open_connection();
        let pending = connection.request("slow", Value::Null);
        let err = transport
            .simulate_message(r#"{"type":"authenticationError"}"#)
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed));
        assert_eq!(connection.status(), ConnectionStatus::Disconnected);
        assert_eq!(pending.wait(), Err(RequestError::Disconnected));
    }

    #[test]
    fn expired_requests_are_taken_from_both_lists() {
        let mut state = ConnectionState::new();
        let now = Instant::now();
        let short = RequestPolicy::new().with_timeout(Duration::from_millis(5));
        let long = RequestPolicy::new().with_timeout(Duration::from_secs(60));

        let (a, _fa) = Request::new(1, Value::Null, short, now);
        let (b, _fb) = Request::new(2, Value::Null, long, now);
        let (c, _fc) = Request::new(3, Value::Null, short, now);
        state.waiting.push(a);
        state.waiting.push(b);
        state.queued.push_back(c);

        assert_eq!(state.next_deadline(), Some(now + Duration::from_millis(5)));
        let expired = state.take_expired(now + Duration::from_millis(5));
        let ids: Vec<u64> = expired.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(state.waiting.len(), 1);
        assert!(state.queued.is_empty());
        assert_eq!(state.next_deadline(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn drop_rejects_pending_requests() {
        let (connection, _transport) = open_connection();
        let sent = connection.request("a", Value::Null);
        let queued = connection.request_with(
            "b",
            Value::Null,
            RequestPolicy::new().with_queue_when_disconnected(true),
        );
        drop(connection);
        assert_eq!(sent.wait(), Err(RequestError::Disconnected));
        assert_eq!(queued.wait(), Err(RequestError::Disconnected));
    }
}
