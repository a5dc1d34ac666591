//! # Common dependencies
//!
//! This internal crate simply re-exports dependencies that are commonly used across other internal
//! crates. Rust has a small `std` library (["and that's OK"](https://blog.nindalf.com/posts/rust-stdlib/)).
//! This crate acts as our internal version of a standard library, like [`stdx`](https://github.com/brson/stdx)
//! and others.
//!
//! The primary benefit of this crate is that there is only one place that version numbers for
//! commonly used dependencies need to be updated.

pub use async_trait;
pub use chrono;
pub use derivative;
pub use derive_more;
pub use eyre;
pub use futures;
pub use indexmap;
pub use itertools;
pub use once_cell;
pub use regex;
pub use schemars;
pub use serde;
pub use serde_json;
pub use serde_yaml;
pub use strum;
pub use tempfile;
pub use tokio;
pub use tracing;
