//! # Runtime Display Options
//!
//! Options are the part of the configuration operators toggle while the
//! server runs (from the `/setconfig` endpoint). They are persisted as JSON
//! in the options file and restored on start. Any change wakes the
//! `OPTIONS` listeners so clients see the new values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::utils::decode::{parse_bool, parse_int};

/// Display options that can be changed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Show jumper nicknames instead of full names on the boards.
    pub display_nicknames: bool,
    /// Show the weather status panel.
    pub display_weather: bool,
    /// Show the winds aloft panel.
    pub display_winds: bool,
    /// Number of load columns shown on the boards.
    pub display_columns: usize,
    /// Loads whose call time is below this many minutes are hidden.
    pub min_call_minutes: i64,
    /// Free-form message shown across the boards.
    pub message: String,
    /// Set when a pilot has asked for the fuel truck.
    pub fuel_requested: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            display_nicknames: true,
            display_weather: true,
            display_winds: true,
            display_columns: 5,
            min_call_minutes: 0,
            message: String::new(),
            fuel_requested: false,
        }
    }
}

impl Options {
    /// # Apply Key/Value Updates
    ///
    /// Applies form or query values onto the options. Keys may be spelled in
    /// `snake_case` or in the `CamelCase` used by the legacy settings page.
    /// Unknown keys and unparseable integers are ignored.
    ///
    /// # Returns
    /// `true` when at least one option changed value.
    pub fn apply_values(&mut self, values: &HashMap<String, String>) -> bool {
        let mut changed = false;
        for (key, value) in values {
            match normalize_key(key).as_str() {
                "display_nicknames" => changed |= set_if_changed(&mut self.display_nicknames, parse_bool(value)),
                "display_weather" => changed |= set_if_changed(&mut self.display_weather, parse_bool(value)),
                "display_winds" => changed |= set_if_changed(&mut self.display_winds, parse_bool(value)),
                "fuel_requested" => changed |= set_if_changed(&mut self.fuel_requested, parse_bool(value)),
                "display_columns" => {
                    if let Some(n) = parse_int(value).and_then(|n| usize::try_from(n).ok()) {
                        changed |= set_if_changed(&mut self.display_columns, n);
                    }
                }
                "min_call_minutes" => {
                    if let Some(n) = parse_int(value) {
                        changed |= set_if_changed(&mut self.min_call_minutes, n);
                    }
                }
                "message" => changed |= set_if_changed(&mut self.message, value.clone()),
                _ => log::debug!("ignoring unknown option '{}'", key),
            }
        }
        changed
    }
}

fn set_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

// "DisplayWeather" -> "display_weather"
fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
