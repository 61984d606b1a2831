//! # LiveSync Protocol
//!
//! Wire messages and signal vocabulary for LiveSync.
//!
//! This crate provides:
//! - [`ClientMessage`] and [`ServerMessage`], the typed frames exchanged
//!   over a LiveSync connection
//! - [`Notification`], a subscription update for one path
//! - [`Signal`], the closed vocabulary of mutations a notification carries
//! - Conversion to and from documents and JSON text
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod signal;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ClientMessage, Notification, Response, ServerMessage};
pub use signal::{Signal, SignalName};

pub use livesync_codec::{Path, Value};
