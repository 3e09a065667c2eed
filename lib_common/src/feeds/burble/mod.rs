//! # Burble Manifest Feed
//!
//! The Burble DZM public manifest normalized into loads and jumpers.
//!
//! - **`model`**: `Jumper` and `Load`, the canonical comparable values.
//! - **`parser`**: the raw JSON to `Vec<Load>` pipeline (slot accounting,
//!   organizer clustering, turning detection, display selection).
//! - **`controller`**: session handling, fetching, and the stored snapshot.

/// Session handling and the stored manifest snapshot.
pub mod controller;
/// Canonical jumper and load types.
pub mod model;
/// Raw payload parsing.
pub mod parser;

pub use controller::BurbleController;
pub use model::{Jumper, Load};
pub use parser::ManifestParser;
