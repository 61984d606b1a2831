//! Paths identifying server-held resources.

use std::fmt;

use crate::decoder::from_json;
use crate::value::Value;

/// An opaque, comparable key identifying an observable server resource.
///
/// A path wraps any document (commonly a string or an array of segments)
/// and orders by the document total order, so it can key a `BTreeMap`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Path(Value);

impl Path {
    /// Creates a path from a document.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Creates a path from a list of segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        Self(Value::Array(segments.into_iter().map(Into::into).collect()))
    }

    /// Parses a command-line style path argument.
    ///
    /// Text that is valid JSON becomes a structured path; anything else is
    /// used verbatim as a string path.
    pub fn parse_arg(arg: &str) -> Self {
        match from_json(arg) {
            Ok(value) => Self(value),
            Err(_) => Self(Value::Text(arg.to_string())),
        }
    }

    /// Returns the underlying document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the path and returns the underlying document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Value> for Path {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self(Value::from(s))
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self(Value::from(s))
    }
}

impl From<Vec<Value>> for Path {
    fn from(segments: Vec<Value>) -> Self {
        Self(Value::Array(segments))
    }
}

impl From<Path> for Value {
    fn from(path: Path) -> Self {
        path.0
    }
}
