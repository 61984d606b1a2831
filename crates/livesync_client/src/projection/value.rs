//! Scalar projection.

use std::sync::{Arc, Weak};

use crate::error::{ClientError, ClientResult};
use crate::observable::{
    AnyProjection, Lifecycle, ObserverId, Projection, ProjectionBase, ProjectionHandle,
    ProjectionKind,
};
use livesync_codec::Value;
use livesync_protocol::{Signal, SignalName};
use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct ValueCore {
    value: Mutex<Option<Value>>,
    base: ProjectionBase,
}

impl Drop for ValueCore {
    fn drop(&mut self) {
        self.base.lifecycle.dispose();
    }
}

/// A local copy of a single document at a path.
///
/// Only the `set` signal applies. Clones share state; dropping the last
/// clone detaches the projection from its observation.
#[derive(Debug, Clone)]
pub struct ObservableValue {
    core: Arc<ValueCore>,
}

impl ObservableValue {
    /// Creates an uninitialized, unattached projection.
    pub fn new() -> Self {
        Self {
            core: Arc::new(ValueCore {
                value: Mutex::new(None),
                base: ProjectionBase::new(),
            }),
        }
    }

    pub(crate) fn from_core(core: Arc<ValueCore>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<ValueCore> {
        Arc::downgrade(&self.core)
    }

    /// Current value, null until the first `set`.
    pub fn get(&self) -> Value {
        self.core.value.lock().clone().unwrap_or_default()
    }

    /// Returns true once a `set` has been applied.
    pub fn is_initialized(&self) -> bool {
        self.core.value.lock().is_some()
    }

    /// Registers an observer. It receives `set [current]` immediately.
    pub fn observe(&self, callback: impl Fn(&str, &Value) + Send + Sync + 'static) -> ObserverId {
        self.core.base.observe(|| self.get(), callback)
    }

    /// Unregisters an observer.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.core.base.unobserve(id)
    }

    /// Stops following the path.
    pub fn dispose(&self) {
        self.core.base.lifecycle.dispose();
    }

    /// Follows the path again after [`ObservableValue::dispose`].
    pub fn respawn(&self) {
        if self.core.base.lifecycle.is_active() {
            return;
        }
        self.reset();
        self.core.base.lifecycle.respawn();
    }

    /// Returns true while attached or attachable.
    pub fn is_active(&self) -> bool {
        self.core.base.lifecycle.is_active()
    }

    /// Returns true if both handles share the same state.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl Default for ObservableValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for ObservableValue {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Value
    }

    fn apply_signal(&self, name: &str, args: &Value) -> ClientResult<()> {
        if SignalName::parse(name) != Some(SignalName::Set) {
            return Err(ClientError::unsupported_signal(name, ProjectionKind::Value));
        }
        let Signal::Set(value) = Signal::parse(name, args)? else {
            return Err(ClientError::unsupported_signal(name, ProjectionKind::Value));
        };

        let _delivery = self.core.base.deliver();
        *self.core.value.lock() = Some(value);
        self.core.base.fire(name, args);
        Ok(())
    }

    fn snapshot(&self) -> Value {
        self.get()
    }

    fn reset(&self) {
        *self.core.value.lock() = None;
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.core.base.lifecycle
    }
}

impl ProjectionHandle for ObservableValue {
    const KIND: ProjectionKind = ProjectionKind::Value;

    fn create() -> Self {
        Self::new()
    }

    fn from_any(any: AnyProjection) -> Option<Self> {
        match any {
            AnyProjection::Value(p) => Some(p),
            _ => None,
        }
    }

    fn into_any(self) -> AnyProjection {
        AnyProjection::Value(self)
    }
}
