//! Keyed list projection.
//!
//! Elements are documents identified by one of their fields. The server
//! keeps the list sorted by that field, so keyed inserts land at the
//! sorted position.

use std::sync::{Arc, Weak};

use crate::error::{ClientError, ClientResult};
use crate::observable::{
    AnyProjection, Lifecycle, ObserverId, Projection, ProjectionBase, ProjectionHandle,
    ProjectionKind,
};
use livesync_codec::Value;
use livesync_protocol::{ProtocolError, Signal, SignalName};
use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct ListCore {
    items: Mutex<Option<Vec<Value>>>,
    base: ProjectionBase,
}

impl Drop for ListCore {
    fn drop(&mut self) {
        self.base.lifecycle.dispose();
    }
}

/// A local copy of an ordered list of documents at a path.
///
/// Supports `set`, `push`, `putByKey`, `removeByKey` and `updateByKey`.
#[derive(Debug, Clone)]
pub struct ObservableList {
    core: Arc<ListCore>,
}

impl ObservableList {
    /// Creates an uninitialized, unattached projection.
    pub fn new() -> Self {
        Self {
            core: Arc::new(ListCore {
                items: Mutex::new(None),
                base: ProjectionBase::new(),
            }),
        }
    }

    pub(crate) fn from_core(core: Arc<ListCore>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<ListCore> {
        Arc::downgrade(&self.core)
    }

    /// Copy of the current elements, empty until initialized.
    pub fn items(&self) -> Vec<Value> {
        self.core.items.lock().clone().unwrap_or_default()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.core.items.lock().as_ref().map_or(0, Vec::len)
    }

    /// Returns true if the list has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once a `set` has been applied.
    pub fn is_initialized(&self) -> bool {
        self.core.items.lock().is_some()
    }

    /// Registers an observer. It receives `set [items]` immediately.
    pub fn observe(&self, callback: impl Fn(&str, &Value) + Send + Sync + 'static) -> ObserverId {
        self.core.base.observe(|| self.snapshot(), callback)
    }

    /// Unregisters an observer.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.core.base.unobserve(id)
    }

    /// Stops following the path.
    pub fn dispose(&self) {
        self.core.base.lifecycle.dispose();
    }

    /// Follows the path again after [`ObservableList::dispose`].
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

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection for ObservableList {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::List
    }

    fn apply_signal(&self, name: &str, args: &Value) -> ClientResult<()> {
        if SignalName::parse(name).is_none() {
            return Err(ClientError::unsupported_signal(name, ProjectionKind::List));
        }
        let signal = Signal::parse(name, args)?;

        let _delivery = self.core.base.deliver();
        {
            let mut guard = self.core.items.lock();
            match signal {
                Signal::Set(value) => {
                    let items = value.into_array().ok_or_else(|| {
                        ProtocolError::invalid_args(name, "list value must be an array")
                    })?;
                    *guard = Some(items);
                }
                other => apply(guard.get_or_insert_with(Vec::new), other),
            }
        }
        self.core.base.fire(name, args);
        Ok(())
    }

    fn snapshot(&self) -> Value {
        Value::Array(self.items())
    }

    fn reset(&self) {
        *self.core.items.lock() = None;
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.core.base.lifecycle
    }
}

impl ProjectionHandle for ObservableList {
    const KIND: ProjectionKind = ProjectionKind::List;

    fn create() -> Self {
        Self::new()
    }

    fn from_any(any: AnyProjection) -> Option<Self> {
        match any {
            AnyProjection::List(p) => Some(p),
            _ => None,
        }
    }

    fn into_any(self) -> AnyProjection {
        AnyProjection::List(self)
    }
}

fn apply(items: &mut Vec<Value>, signal: Signal) {
    match signal {
        Signal::Set(value) => *items = value.into_array().unwrap_or_default(),
        Signal::Push(element) => items.push(element),
        Signal::PutByKey {
            key,
            value,
            element,
            reverse,
            ..
        } => put_by_key(items, &key, &value, element, reverse),
        Signal::RemoveByKey { key, value, .. } => remove_by_key(items, &key, &value),
        Signal::UpdateByKey {
            key,
            value,
            element,
            ..
        } => update_by_key(items, &key, &value, element),
    }
}

/// Replaces the first element whose `key` equals `value`, or inserts
/// `element` at the sorted position.
///
/// Forward scans insert before the first greater key and append when
/// there is none. Reverse scans walk from the end, insert after the first
/// smaller key and prepend when there is none.
pub(crate) fn put_by_key(
    items: &mut Vec<Value>,
    key: &str,
    value: &Value,
    element: Value,
    reverse: bool,
) {
    if reverse {
        for index in (0..items.len()).rev() {
            let current = items[index].field(key);
            if current == value {
                items[index] = element;
                return;
            }
            if current < value {
                items.insert(index + 1, element);
                return;
            }
        }
        items.insert(0, element);
    } else {
        for index in 0..items.len() {
            let current = items[index].field(key);
            if current == value {
                items[index] = element;
                return;
            }
            if current > value {
                items.insert(index, element);
                return;
            }
        }
        items.push(element);
    }
}

/// Removes every element whose `key` equals `value`.
pub(crate) fn remove_by_key(items: &mut Vec<Value>, key: &str, value: &Value) {
    items.retain(|item| item.field(key) != value);
}

/// Replaces every element whose `key` equals `value`, keeping positions.
pub(crate) fn update_by_key(items: &mut [Value], key: &str, value: &Value, element: Value) {
    for item in items.iter_mut() {
        if item.field(key) == value {
            *item = element.clone();
        }
    }
}
