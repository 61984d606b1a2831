//! The capability a projection implements to follow an observation.
//!
//! An [`Observation`](crate::Observation) knows nothing about what a
//! projection stores. It only hands it signals through
//! [`Projection::apply_signal`] and learns about its liveness through the
//! [`Lifecycle`] hooks: `on_dispose` fires when the projection becomes
//! unused (explicitly or because its last handle was dropped), and
//! `on_respawn` fires when it wants to follow the path again.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::ClientResult;
use crate::projection::list::ListCore;
use crate::projection::value::ValueCore;
use crate::projection::{ObservableList, ObservableValue};
use livesync_codec::Value;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

/// The kinds of projection an observation can serve.
///
/// At most one projection of each kind is attached per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectionKind {
    /// A single document, see [`ObservableValue`].
    Value,
    /// An ordered list of documents, see [`ObservableList`].
    List,
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionKind::Value => f.write_str("value"),
            ProjectionKind::List => f.write_str("list"),
        }
    }
}

/// A local mirror of server state that consumes signals.
pub trait Projection: Send + Sync {
    /// Kind of this projection.
    fn kind(&self) -> ProjectionKind;

    /// Applies one signal and forwards it to the projection's observers.
    fn apply_signal(&self, name: &str, args: &Value) -> ClientResult<()>;

    /// Returns a copy of the current local state.
    fn snapshot(&self) -> Value;

    /// Drops local state, returning to the uninitialized state.
    fn reset(&self);

    /// Liveness flag and hooks.
    fn lifecycle(&self) -> &Lifecycle;
}

/// A projection type that an observation can create and hand out.
pub trait ProjectionHandle: Projection + Clone + Sized + 'static {
    /// Kind served by this type.
    const KIND: ProjectionKind;

    /// Creates a fresh, uninitialized projection.
    fn create() -> Self;

    /// Extracts this type from the tagged variant.
    fn from_any(any: AnyProjection) -> Option<Self>;

    /// Wraps this projection in the tagged variant.
    fn into_any(self) -> AnyProjection;
}

/// Any projection, tagged by kind.
#[derive(Debug, Clone)]
pub enum AnyProjection {
    /// A scalar projection.
    Value(ObservableValue),
    /// A keyed list projection.
    List(ObservableList),
}

impl AnyProjection {
    /// Kind of the wrapped projection.
    pub fn kind(&self) -> ProjectionKind {
        match self {
            AnyProjection::Value(_) => ProjectionKind::Value,
            AnyProjection::List(_) => ProjectionKind::List,
        }
    }

    /// The wrapped projection as a capability object.
    pub fn as_projection(&self) -> &dyn Projection {
        match self {
            AnyProjection::Value(p) => p,
            AnyProjection::List(p) => p,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakProjection {
        match self {
            AnyProjection::Value(p) => WeakProjection::Value(p.downgrade()),
            AnyProjection::List(p) => WeakProjection::List(p.downgrade()),
        }
    }

    /// Identity of the shared projection state.
    pub(crate) fn addr(&self) -> usize {
        self.downgrade().addr()
    }
}

/// Non-owning reference to a projection.
#[derive(Debug, Clone)]
pub(crate) enum WeakProjection {
    Value(Weak<ValueCore>),
    List(Weak<ListCore>),
}

impl WeakProjection {
    pub(crate) fn upgrade(&self) -> Option<AnyProjection> {
        match self {
            WeakProjection::Value(w) => w
                .upgrade()
                .map(|core| AnyProjection::Value(ObservableValue::from_core(core))),
            WeakProjection::List(w) => w
                .upgrade()
                .map(|core| AnyProjection::List(ObservableList::from_core(core))),
        }
    }

    pub(crate) fn kind(&self) -> ProjectionKind {
        match self {
            WeakProjection::Value(_) => ProjectionKind::Value,
            WeakProjection::List(_) => ProjectionKind::List,
        }
    }

    /// Stays valid while the projection is being dropped.
    pub(crate) fn addr(&self) -> usize {
        match self {
            WeakProjection::Value(w) => Weak::as_ptr(w) as *const () as usize,
            WeakProjection::List(w) => Weak::as_ptr(w) as *const () as usize,
        }
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Liveness of a projection and the hooks fired when it changes.
pub struct Lifecycle {
    active: AtomicBool,
    on_dispose: Mutex<Vec<Hook>>,
    on_respawn: Mutex<Vec<Hook>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            on_dispose: Mutex::new(Vec::new()),
            on_respawn: Mutex::new(Vec::new()),
        }
    }

    /// Returns true while the projection wants signals.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Registers a hook fired when the projection becomes unused.
    pub fn on_dispose(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_dispose.lock().push(Arc::new(hook));
    }

    /// Registers a hook fired when a disposed projection is reused.
    pub fn on_respawn(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_respawn.lock().push(Arc::new(hook));
    }

    /// Marks the projection unused. Returns false if it already was.
    pub(crate) fn dispose(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        let hooks = self.on_dispose.lock().clone();
        for hook in hooks {
            hook();
        }
        true
    }

    /// Marks the projection used again. Returns false if it already was.
    pub(crate) fn respawn(&self) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }
        let hooks = self.on_respawn.lock().clone();
        for hook in hooks {
            hook();
        }
        true
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("active", &self.is_active())
            .field("on_dispose", &self.on_dispose.lock().len())
            .field("on_respawn", &self.on_respawn.lock().len())
            .finish()
    }
}

/// Handle returned by a projection's `observe`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type ObserverFn = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// State every projection carries besides its data: observers,
/// lifecycle, and the delivery lock that keeps each observer's view
/// ordered.
pub(crate) struct ProjectionBase {
    delivery: ReentrantMutex<()>,
    next_observer: AtomicU64,
    observers: Mutex<Vec<(ObserverId, ObserverFn)>>,
    pub(crate) lifecycle: Lifecycle,
}

impl ProjectionBase {
    pub(crate) fn new() -> Self {
        Self {
            delivery: ReentrantMutex::new(()),
            next_observer: AtomicU64::new(1),
            observers: Mutex::new(Vec::new()),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Held while a mutation is applied and forwarded.
    pub(crate) fn deliver(&self) -> ReentrantMutexGuard<'_, ()> {
        self.delivery.lock()
    }

    /// Registers `callback` and sends it `set [current]` first.
    pub(crate) fn observe(
        &self,
        current: impl FnOnce() -> Value,
        callback: impl Fn(&str, &Value) + Send + Sync + 'static,
    ) -> ObserverId {
        let _delivery = self.deliver();
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::SeqCst));
        let callback: ObserverFn = Arc::new(callback);
        callback("set", &Value::Array(vec![current()]));
        self.observers.lock().push((id, callback));
        id
    }

    pub(crate) fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Forwards a signal. Callers hold the delivery guard.
    pub(crate) fn fire(&self, name: &str, args: &Value) {
        let observers: Vec<ObserverFn> = self
            .observers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in observers {
            callback(name, args);
        }
    }
}

impl fmt::Debug for ProjectionBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionBase")
            .field("observers", &self.observer_count())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn lifecycle_hooks_fire_on_transitions_only() {
        let lifecycle = Lifecycle::new();
        let disposed = Arc::new(AtomicUsize::new(0));
        let respawned = Arc::new(AtomicUsize::new(0));
        {
            let disposed = Arc::clone(&disposed);
            lifecycle.on_dispose(move || {
                disposed.fetch_add(1, Ordering::SeqCst);
            });
            let respawned = Arc::clone(&respawned);
            lifecycle.on_respawn(move || {
                respawned.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(!lifecycle.respawn());
        assert!(lifecycle.dispose());
        assert!(!lifecycle.dispose());
        assert!(!lifecycle.is_active());
        assert!(lifecycle.respawn());

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(respawned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observers_get_current_state_first() {
        let base = ProjectionBase::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = base.observe(
            || Value::from(7),
            move |name, args| sink.lock().push((name.to_string(), args.clone())),
        );

        base.fire("set", &Value::from(vec![8]));
        assert!(base.unobserve(id));
        assert!(!base.unobserve(id));
        base.fire("set", &Value::from(vec![9]));

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                ("set".to_string(), Value::from(vec![7])),
                ("set".to_string(), Value::from(vec![8])),
            ]
        );
    }

    #[test]
    fn kind_display() {
        assert_eq!(ProjectionKind::Value.to_string(), "value");
        assert_eq!(ProjectionKind::List.to_string(), "list");
    }
}
