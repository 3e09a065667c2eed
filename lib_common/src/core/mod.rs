//! # Core Engine Module
//!
//! This module ties the feeds together into one live picture of the dropzone
//! and streams it to clients.
//!
//! ## Core Components:
//!
//! - **`scheduler`**: one self-scheduling refresh loop per source. Failures are
//!   logged and retried on the next pass; successes that changed something
//!   raise a [`SourceChangeFlags`] bit.
//!
//! - **`state`**: the aggregate store. Holds every source controller, derives
//!   combined views (coordinates, exit separation, sunrise/sunset countdowns)
//!   and owns the listener registry change flags travel through.
//!
//! - **`solar`** and **`sunwatch`**: sunrise/sunset times and the once-a-second
//!   watch raising calendar-edge and pre-event flags.
//!
//! - **`update`**: the wire model streamed to clients and its diff.
//!
//! - **`dispatcher`**: the single-owner actor holding the per-client baseline,
//!   turning flags into minimal updates and fanning them out.
//!
//! Data flows one way: source → scheduler → state → flags → dispatcher → clients.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The update fan-out actor.
pub mod dispatcher;
/// Change flags.
pub mod flags;
/// Per-source refresh loops.
pub mod scheduler;
/// Sunrise and sunset computation.
pub mod solar;
/// The aggregate state store.
pub mod state;
/// The sunrise/sunset watch loop.
pub mod sunwatch;
/// Client-facing update model and diff.
pub mod update;

// --- Public API Re-exports ---
pub use dispatcher::{DispatchError, Dispatcher, DispatcherHandle, UpdateReceiver};
pub use flags::SourceChangeFlags;
pub use solar::SolarError;
pub use state::DropzoneState;
pub use update::{ManifestUpdate, Section};
