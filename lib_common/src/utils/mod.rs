//! # Utilities Module
//!
//! This module serves as a collection point for general-purpose helpers that
//! are shared across the `lib_common` crate.
//!
//! ## Contained Modules:
//!
//! - **`decode`**: Tolerant coercion of loosely typed JSON scalars. Upstream
//!   feeds (Burble in particular) report the same field as an int, a float,
//!   a numeric string or a bool depending on the record, so every reader goes
//!   through these helpers instead of matching on `serde_json::Value` itself.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Tolerant bool/int decoding for loosely typed JSON values.
pub mod decode;
