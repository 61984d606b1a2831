//! The signal vocabulary carried by notifications.
//!
//! Arguments are positional arrays:
//!
//! | Signal | Arguments |
//! |---|---|
//! | `set` | `[value]` |
//! | `push` | `[element]` |
//! | `putByKey` | `[key, value, element, reverse?, old?]` |
//! | `removeByKey` | `[key, value, old?]` |
//! | `updateByKey` | `[key, value, element, old?]` |
//!
//! The older `putByField`, `removeByField` and `updateByField` names are
//! accepted as aliases.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};
use livesync_codec::Value;

/// Name of a supported signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalName {
    /// Replace the whole value.
    Set,
    /// Append an element.
    Push,
    /// Replace or insert an element by key.
    PutByKey,
    /// Remove every element with a key.
    RemoveByKey,
    /// Replace every element with a key, in place.
    UpdateByKey,
}

impl SignalName {
    /// Looks up a wire name, accepting the `*ByField` aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "set" => Some(SignalName::Set),
            "push" => Some(SignalName::Push),
            "putByKey" | "putByField" => Some(SignalName::PutByKey),
            "removeByKey" | "removeByField" => Some(SignalName::RemoveByKey),
            "updateByKey" | "updateByField" => Some(SignalName::UpdateByKey),
            _ => None,
        }
    }

    /// Returns the canonical wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalName::Set => "set",
            SignalName::Push => "push",
            SignalName::PutByKey => "putByKey",
            SignalName::RemoveByKey => "removeByKey",
            SignalName::UpdateByKey => "updateByKey",
        }
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded mutation signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// Replace the whole value.
    Set(Value),
    /// Append an element.
    Push(Value),
    /// Replace the first element whose `key` field equals `value`, or
    /// insert `element` at its sorted position.
    PutByKey {
        /// Field name compared on each element.
        key: String,
        /// Field value to match.
        value: Value,
        /// Replacement or inserted element.
        element: Value,
        /// Scan from the end of the list.
        reverse: bool,
        /// Previous element, when the server sent it.
        old: Option<Value>,
    },
    /// Remove every element whose `key` field equals `value`.
    RemoveByKey {
        /// Field name compared on each element.
        key: String,
        /// Field value to match.
        value: Value,
        /// Previous element, when the server sent it.
        old: Option<Value>,
    },
    /// Replace every element whose `key` field equals `value`.
    UpdateByKey {
        /// Field name compared on each element.
        key: String,
        /// Field value to match.
        value: Value,
        /// Replacement element.
        element: Value,
        /// Previous element, when the server sent it.
        old: Option<Value>,
    },
}

impl Signal {
    /// Decodes a signal from its wire name and positional arguments.
    pub fn parse(name: &str, args: &Value) -> ProtocolResult<Self> {
        let kind =
            SignalName::parse(name).ok_or_else(|| ProtocolError::UnknownSignal(name.to_string()))?;
        let args = Args::new(name, args)?;

        let signal = match kind {
            SignalName::Set => Signal::Set(args.required(0)?.clone()),
            SignalName::Push => Signal::Push(args.required(0)?.clone()),
            SignalName::PutByKey => Signal::PutByKey {
                key: args.key()?,
                value: args.required(1)?.clone(),
                element: args.required(2)?.clone(),
                reverse: args.flag(3)?,
                old: args.optional(4),
            },
            SignalName::RemoveByKey => Signal::RemoveByKey {
                key: args.key()?,
                value: args.required(1)?.clone(),
                old: args.optional(2),
            },
            SignalName::UpdateByKey => Signal::UpdateByKey {
                key: args.key()?,
                value: args.required(1)?.clone(),
                element: args.required(2)?.clone(),
                old: args.optional(3),
            },
        };
        Ok(signal)
    }

    /// Returns the signal name.
    pub fn name(&self) -> SignalName {
        match self {
            Signal::Set(_) => SignalName::Set,
            Signal::Push(_) => SignalName::Push,
            Signal::PutByKey { .. } => SignalName::PutByKey,
            Signal::RemoveByKey { .. } => SignalName::RemoveByKey,
            Signal::UpdateByKey { .. } => SignalName::UpdateByKey,
        }
    }

    /// Encodes the positional argument array.
    pub fn to_args(&self) -> Value {
        let mut args = match self {
            Signal::Set(v) | Signal::Push(v) => vec![v.clone()],
            Signal::PutByKey {
                key,
                value,
                element,
                reverse,
                ..
            } => vec![
                Value::from(key.as_str()),
                value.clone(),
                element.clone(),
                Value::Bool(*reverse),
            ],
            Signal::RemoveByKey { key, value, .. } => vec![Value::from(key.as_str()), value.clone()],
            Signal::UpdateByKey {
                key,
                value,
                element,
                ..
            } => vec![Value::from(key.as_str()), value.clone(), element.clone()],
        };
        if let Some(old) = self.old() {
            args.push(old.clone());
        }
        Value::Array(args)
    }

    fn old(&self) -> Option<&Value> {
        match self {
            Signal::PutByKey { old, .. }
            | Signal::RemoveByKey { old, .. }
            | Signal::UpdateByKey { old, .. } => old.as_ref(),
            _ => None,
        }
    }
}

struct Args<'a> {
    signal: &'a str,
    items: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(signal: &'a str, args: &'a Value) -> ProtocolResult<Self> {
        let items = args
            .as_array()
            .ok_or_else(|| ProtocolError::invalid_args(signal, "arguments must be an array"))?;
        Ok(Self { signal, items })
    }

    fn required(&self, index: usize) -> ProtocolResult<&'a Value> {
        self.items.get(index).ok_or_else(|| {
            ProtocolError::invalid_args(self.signal, format!("missing argument {index}"))
        })
    }

    fn optional(&self, index: usize) -> Option<Value> {
        self.items.get(index).cloned()
    }

    fn key(&self) -> ProtocolResult<String> {
        self.required(0)?
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::invalid_args(self.signal, "key must be a string"))
    }

    fn flag(&self, index: usize) -> ProtocolResult<bool> {
        match self.items.get(index) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ProtocolError::invalid_args(
                self.signal,
                format!("argument {index} must be a boolean"),
            )),
        }
    }
}
