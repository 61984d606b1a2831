//! # LiveSync Codec
//!
//! Document type and JSON text encoding for LiveSync.
//!
//! This crate provides:
//! - [`Value`], a structured document whose map fields keep their
//!   insertion order
//! - A total ordering over documents, so they can be used as map keys
//! - [`Path`], the comparable key identifying a server-held resource
//! - JSON text parsing and serialization
//!
//! ## Ordering Rules
//!
//! - Values of different kinds order as
//!   `null < bool < number < text < array < map`
//! - Integers and floats compare numerically (`1 == 1.0`)
//! - Arrays compare element by element
//! - Maps compare by their fields sorted by name, so field order does not
//!   affect equality
//!
//! ## Usage
//!
//! ```
//! use livesync_codec::{from_json, to_json, Value};
//!
//! let value = from_json(r#"{"type":"ping","n":1}"#).unwrap();
//! assert_eq!(value.get("type"), Some(&Value::from("ping")));
//!
//! let text = to_json(&value).unwrap();
//! assert_eq!(text, r#"{"type":"ping","n":1}"#);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod path;
mod value;

pub use decoder::from_json;
pub use encoder::{to_json, to_json_pretty};
pub use error::{CodecError, CodecResult};
pub use path::Path;
pub use value::Value;
