//! Subscriptions to server paths.
//!
//! An [`Observation`] owns the projections attached to one path and a
//! replay log of the notifications received since the current link
//! opened. A projection that attaches late first receives the log, in
//! order, and only then live notifications, so every projection on a path
//! sees the same sequence.
//!
//! The wire subscription follows the subscriber set: the first attached
//! projection puts the observation in the connection's table and sends
//! `observe`, the last detached one sends `unobserve` and removes it.
//!
//! Each observation has its own re-entrant lock. A projection dropped
//! from inside one of its observer callbacks detaches on the same thread
//! that is delivering the notification.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::connection::Shared;
use crate::observable::{AnyProjection, ProjectionHandle, WeakProjection};
use crate::projection::{ObservableList, ObservableValue};
use livesync_codec::Path;
use livesync_protocol::Notification;
use parking_lot::ReentrantMutex;
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct Subscriber {
    projection: WeakProjection,
    addr: usize,
}

#[derive(Debug, Default)]
struct ObservationState {
    subscribers: Vec<Subscriber>,
    replay_log: Vec<Notification>,
    /// Link the replay log belongs to.
    log_epoch: u64,
    /// Link on which `observe` was last sent.
    observed_epoch: Option<u64>,
    /// In the connection's table.
    registered: bool,
    /// Set once the last subscriber left, or when another observation
    /// took the path first. A retired observation is not in the table.
    retired: bool,
}

impl ObservationState {
    fn roll_epoch(&mut self, epoch: u64) {
        if self.log_epoch != epoch {
            self.replay_log.clear();
            self.log_epoch = epoch;
        }
    }

    fn wants_observe(&self) -> bool {
        !self.retired && !self.subscribers.is_empty()
    }
}

/// Where a new subscriber of an observation goes.
enum Successor {
    Here,
    Forward(Arc<Observation>),
    /// Retired with no connection left to forward to.
    Orphan,
}

/// The subscription for one path.
pub struct Observation {
    path: Path,
    connection: Weak<Shared>,
    state: ReentrantMutex<RefCell<ObservationState>>,
}

impl Observation {
    pub(crate) fn new(path: Path, connection: Weak<Shared>) -> Self {
        Self {
            path,
            connection,
            state: ReentrantMutex::new(RefCell::new(ObservationState::default())),
        }
    }

    /// Path this observation follows.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of attached projections.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().borrow().subscribers.len()
    }

    /// Number of notifications a newly attached projection would replay.
    pub fn replay_len(&self) -> usize {
        self.state.lock().borrow().replay_log.len()
    }

    /// Copy of the replay log.
    pub fn replay_log(&self) -> Vec<Notification> {
        self.state.lock().borrow().replay_log.clone()
    }

    /// Returns true once the last projection has detached, or when
    /// another observation for the same path was registered first.
    ///
    /// Asking a retired observation for a projection transparently uses
    /// the path's current observation.
    pub fn is_retired(&self) -> bool {
        self.state.lock().borrow().retired
    }

    /// Returns the projection of type `P` for this path, creating and
    /// attaching it if needed.
    ///
    /// Repeated calls return the same projection while it is attached.
    pub fn observable<P: ProjectionHandle>(self: &Arc<Self>) -> P {
        let guard = self.state.lock();
        match self.successor(&guard) {
            Successor::Here => {}
            Successor::Forward(next) => {
                drop(guard);
                return next.observable::<P>();
            }
            Successor::Orphan => return P::create(),
        }

        let existing = guard
            .borrow()
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.projection.kind() == P::KIND)
            .find_map(|subscriber| subscriber.projection.upgrade());
        if let Some(projection) = existing.and_then(P::from_any) {
            return projection;
        }

        let projection = P::create();
        let any = projection.clone().into_any();
        self.install_hooks(&any);
        self.attach_locked(&guard, any);
        projection
    }

    /// Returns the scalar projection for this path.
    pub fn value(self: &Arc<Self>) -> ObservableValue {
        self.observable()
    }

    /// Returns the list projection for this path.
    pub fn list(self: &Arc<Self>) -> ObservableList {
        self.observable()
    }

    /// Attaches a projection created by the caller.
    ///
    /// Unlike [`Observation::observable`] this allows several projections
    /// of the same kind on one path. The projection detaches when it is
    /// disposed or dropped. Attaching an already attached projection does
    /// nothing.
    pub fn attach<P: ProjectionHandle>(self: &Arc<Self>, projection: &P) {
        let any = projection.clone().into_any();
        let addr = any.addr();
        let guard = self.state.lock();
        let known = guard
            .borrow()
            .subscribers
            .iter()
            .any(|subscriber| subscriber.addr == addr);
        if known {
            return;
        }
        drop(guard);

        self.install_hooks(&any);
        self.reattach(any);
    }

    /// Wires the projection's lifecycle to this path.
    fn install_hooks(&self, projection: &AnyProjection) {
        let lifecycle = projection.as_projection().lifecycle();
        let addr = projection.addr();

        let connection = self.connection.clone();
        let path = self.path.clone();
        lifecycle.on_dispose(move || {
            let Some(shared) = connection.upgrade() else {
                return;
            };
            if let Some(observation) = shared.find_observation(&path) {
                observation.detach(addr);
            }
        });

        let connection = self.connection.clone();
        let path = self.path.clone();
        let weak = projection.downgrade();
        lifecycle.on_respawn(move || {
            if let (Some(shared), Some(projection)) = (connection.upgrade(), weak.upgrade()) {
                shared.observation(path.clone()).reattach(projection);
            }
        });
    }

    /// Adds a subscriber, following the path's current observation if
    /// this one is retired.
    pub(crate) fn reattach(self: &Arc<Self>, projection: AnyProjection) {
        let guard = self.state.lock();
        match self.successor(&guard) {
            Successor::Here => self.attach_locked(&guard, projection),
            Successor::Forward(next) => {
                drop(guard);
                next.reattach(projection);
            }
            Successor::Orphan => {}
        }
    }

    /// Registers this observation on first use. A retired observation,
    /// or one that lost the path to another, forwards to the path's
    /// current observation.
    fn successor(self: &Arc<Self>, state: &RefCell<ObservationState>) -> Successor {
        let (retired, registered) = {
            let state = state.borrow();
            (state.retired, state.registered)
        };
        if retired {
            return match self.connection.upgrade() {
                Some(shared) => Successor::Forward(shared.observation(self.path.clone())),
                None => Successor::Orphan,
            };
        }
        if registered {
            return Successor::Here;
        }
        let Some(shared) = self.connection.upgrade() else {
            return Successor::Here;
        };
        match shared.register(self) {
            Ok(()) => {
                state.borrow_mut().registered = true;
                Successor::Here
            }
            Err(current) => {
                state.borrow_mut().retired = true;
                debug!(path = %self.path, "path already observed, forwarding");
                Successor::Forward(current)
            }
        }
    }

    fn attach_locked(&self, state: &RefCell<ObservationState>, projection: AnyProjection) {
        let addr = projection.addr();
        {
            let mut state = state.borrow_mut();
            if !state.subscribers.iter().any(|s| s.addr == addr) {
                state.subscribers.push(Subscriber {
                    projection: projection.downgrade(),
                    addr,
                });
            }
        }

        self.ensure_observed(state);

        let log = state.borrow().replay_log.clone();
        debug!(
            path = %self.path,
            kind = %projection.kind(),
            replayed = log.len(),
            "projection attached"
        );
        for notification in &log {
            self.deliver(&projection, notification);
        }
    }

    /// Removes the subscriber at `addr`; retires the observation when it
    /// was the last one.
    pub(crate) fn detach(&self, addr: usize) {
        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            let before = state.subscribers.len();
            state.subscribers.retain(|s| s.addr != addr);
            if state.subscribers.len() == before {
                return;
            }
            if !state.subscribers.is_empty() || state.retired {
                debug!(
                    path = %self.path,
                    remaining = state.subscribers.len(),
                    "projection detached"
                );
                return;
            }
            state.retired = true;
            state.replay_log.clear();
            state.observed_epoch = None;
        }

        debug!(path = %self.path, "last projection detached");
        if let Some(shared) = self.connection.upgrade() {
            shared.retire(self);
        }
    }

    /// Sends `observe` if the path is wanted and not yet observed on the
    /// current link.
    fn ensure_observed(&self, state: &RefCell<ObservationState>) {
        let (wanted, observed) = {
            let state = state.borrow();
            (state.wants_observe(), state.observed_epoch)
        };
        if !wanted {
            return;
        }
        let Some(shared) = self.connection.upgrade() else {
            return;
        };
        if let Some(epoch) = shared.observe_once(&self.path, observed) {
            state.borrow_mut().observed_epoch = Some(epoch);
            debug!(path = %self.path, epoch, "observe sent");
        }
    }

    /// A new link opened: the replay log is stale.
    pub(crate) fn handle_connect(&self, epoch: u64) {
        let guard = self.state.lock();
        guard.borrow_mut().roll_epoch(epoch);
        self.ensure_observed(&guard);
    }

    pub(crate) fn handle_disconnect(&self) {
        trace!(path = %self.path, "link lost");
    }

    /// Records a notification and fans it out.
    ///
    /// Returns false if nobody is subscribed.
    pub(crate) fn handle_notify(&self, notification: &Notification, epoch: u64) -> bool {
        let guard = self.state.lock();
        let targets: Vec<AnyProjection> = {
            let mut state = guard.borrow_mut();
            if !state.wants_observe() {
                return false;
            }
            state.roll_epoch(epoch);
            state.replay_log.push(notification.clone());
            state
                .subscribers
                .iter()
                .filter_map(|subscriber| subscriber.projection.upgrade())
                .collect()
        };

        trace!(
            path = %self.path,
            signal = %notification.signal,
            subscribers = targets.len(),
            "notification"
        );
        for projection in &targets {
            self.deliver(projection, notification);
        }
        drop(targets);
        drop(guard);
        true
    }

    fn deliver(&self, projection: &AnyProjection, notification: &Notification) {
        let result = projection
            .as_projection()
            .apply_signal(&notification.signal, &notification.args);
        if let Err(e) = result {
            warn!(
                path = %self.path,
                signal = %notification.signal,
                kind = %projection.kind(),
                error = %e,
                "projection rejected signal"
            );
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock();
        let state = guard.borrow();
        f.debug_struct("Observation")
            .field("path", &self.path)
            .field("subscribers", &state.subscribers.len())
            .field("replay_log", &state.replay_log.len())
            .field("registered", &state.registered)
            .field("retired", &state.retired)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Projection;
    use livesync_codec::Value;

    fn detached(path: &str) -> Arc<Observation> {
        Arc::new(Observation::new(Path::from(path), Weak::new()))
    }

    fn addr_of<P: ProjectionHandle>(projection: &P) -> usize {
        projection.clone().into_any().addr()
    }

    fn set(path: &str, value: i64) -> Notification {
        Notification::new(path, "set", Value::from(vec![value]))
    }

    #[test]
    fn same_kind_returns_same_projection() {
        let observation = detached("status");
        let a = observation.value();
        let b = observation.value();
        assert!(a.same_as(&b));
        assert_eq!(observation.subscriber_count(), 1);

        let _list = observation.list();
        assert_eq!(observation.subscriber_count(), 2);
    }

    #[test]
    fn late_subscriber_replays_log() {
        let observation = detached("counter");
        let first = observation.value();
        assert!(observation.handle_notify(&set("counter", 1), 1));
        assert!(observation.handle_notify(&set("counter", 2), 1));
        assert_eq!(first.get(), Value::from(2));

        let late = ObservableValue::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        late.observe(move |_, args| sink.lock().push(args.at(0).clone()));
        observation.attach(&late);
        assert!(observation.handle_notify(&set("counter", 3), 1));

        assert_eq!(
            *seen.lock(),
            vec![Value::Null, Value::from(1), Value::from(2), Value::from(3)]
        );
    }

    #[test]
    fn new_epoch_clears_log() {
        let observation = detached("counter");
        let _value = observation.value();
        observation.handle_notify(&set("counter", 1), 1);
        assert_eq!(observation.replay_len(), 1);

        observation.handle_connect(2);
        assert_eq!(observation.replay_len(), 0);

        observation.handle_notify(&set("counter", 2), 2);
        observation.handle_connect(2);
        assert_eq!(observation.replay_len(), 1);
    }

    #[test]
    fn dropping_last_projection_retires() {
        let observation = detached("status");
        let value = observation.value();
        observation.handle_notify(&set("status", 1), 1);

        // Hooks reach the observation through the connection table; with
        // no connection, detach directly.
        observation.detach(addr_of(&value));
        assert!(observation.is_retired());
        assert_eq!(observation.replay_len(), 0);
        assert!(!observation.handle_notify(&set("status", 2), 1));
    }

    #[test]
    fn rejected_signal_does_not_stop_fan_out() {
        let observation = detached("items");
        let value = observation.value();
        let list = observation.list();

        let push = Notification::new("items", "push", Value::from(vec![1]));
        assert!(observation.handle_notify(&push, 1));
        assert_eq!(list.items(), vec![Value::from(1)]);
        assert!(!value.is_initialized());
        assert_eq!(value.snapshot(), Value::Null);
    }
}
