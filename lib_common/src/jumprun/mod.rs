//! # Jump Run
//!
//! The jump run is the ground track the aircraft flies for exits: a main
//! heading, an exit distance, an optional offset, up to four hook turns and
//! up to four parallel runs, anchored at an origin coordinate. Operators set
//! it from a form; it is persisted to a JSON state file and cleared every
//! morning at sunrise.
//!
//! - **`model`**: the `Jumprun` value and its `Turn`s.
//! - **`controller`**: restore/persist, validated updates and reset.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

/// Persisted jump run state and validated updates.
pub mod controller;
/// The jump run value type.
pub mod model;

pub use controller::JumprunController;
pub use model::{Jumprun, Turn};

/// Errors raised while updating or persisting the jump run.
#[derive(Error, Debug)]
pub enum JumprunError {
    /// A submitted value could not be parsed.
    #[error("cannot parse {key}: {value:?}")]
    Parse {
        /// Form key.
        key: String,
        /// Submitted text.
        value: String,
    },

    /// A heading is outside 0..=359.
    #[error("{key} out of range: {value}")]
    OutOfRange {
        /// Form key.
        key: String,
        /// Submitted heading.
        value: i64,
    },

    /// The state file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The state file is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
