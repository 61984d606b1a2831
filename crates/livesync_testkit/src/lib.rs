//! # LiveSync Testkit
//!
//! Test utilities for LiveSync.
//!
//! This crate provides:
//! - Server frame builders for driving a client through a mock transport
//! - Property-based test generators using proptest
//! - Helpers for running the same closure on many threads at once
//!
//! ## Usage
//!
//! ```
//! use livesync_testkit::fixtures;
//!
//! let frame = fixtures::response(3, "done".into());
//! assert_eq!(frame, r#"{"responseId":3,"response":"done"}"#);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}
