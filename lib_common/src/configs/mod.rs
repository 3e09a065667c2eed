//! # Configuration Modules
//!
//! This module aggregates the configuration consumed by the manifest core:
//! the static settings read once from a JSON file and the runtime display
//! options that may be changed while the server is running.

// // Statements: Exporting sub-modules to make them accessible via lib_common::configs
/// Static settings loaded from a JSON file, with typed accessors.
pub mod settings;

/// Runtime display options persisted next to the settings.
pub mod options;

pub use options::Options;
pub use settings::{Settings, SettingsConfig, SettingsError};
