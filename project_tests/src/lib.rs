//! # Integration Test Fixtures
//!
//! Upstream payload builders and an offline dropzone state shared by the
//! integration tests under `tests/`. Payloads are built with `serde_json::json!`
//! in the shape the Burble public manifest and the winds aloft service return.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::path::Path;
use std::sync::Arc;

use lib_common::configs::{Settings, SettingsConfig};
use lib_common::core::DropzoneState;
use serde_json::{json, Value};

/// A sport jumper record.
pub fn sport(id: i64, name: &str, jump: &str) -> Value {
    json!({ "id": id, "name": name, "type": "Sport Jumper", "jump": jump, "is_public": true })
}

/// A sport jumper record in a named group.
pub fn grouped(id: i64, name: &str, jump: &str, group: &str) -> Value {
    let mut record = sport(id, name, jump);
    record["group_number"] = json!(group);
    record
}

/// One load record.
pub fn load(id: i64, name: &str, time_left: i64, groups: Vec<Vec<Value>>) -> Value {
    json!({
        "id": id,
        "name": name,
        "time_left": time_left,
        "max_slots": 23,
        "groups": groups,
    })
}

/// A full manifest payload.
pub fn manifest(loads: Vec<Value>) -> Value {
    json!({ "loads": loads })
}

/// A winds aloft payload with `count` samples, `speed` knots at every altitude.
pub fn winds(count: usize, speed: i64) -> Value {
    let mut direction = serde_json::Map::new();
    let mut speeds = serde_json::Map::new();
    let mut temps = serde_json::Map::new();
    for i in 0..count {
        let key = (i * 1000).to_string();
        direction.insert(key.clone(), json!(250));
        speeds.insert(key.clone(), json!(speed));
        temps.insert(key, json!(15 - 2 * i as i64));
    }
    json!({ "validtime": "18", "direction": direction, "speed": speeds, "temp": temps })
}

/// Settings with every optional source enabled, state files under `dir`.
pub fn config_in(dir: &Path) -> SettingsConfig {
    let mut config = SettingsConfig::default();
    config.options_file = Some(dir.join("options.json"));
    config.jumprun.enabled = true;
    config.jumprun.state_file = dir.join("jumprun.json");
    config
}

/// An offline dropzone state; sources are fed by applying payloads directly.
pub fn dropzone(config: SettingsConfig) -> Arc<DropzoneState> {
    let settings = Settings::new(config).expect("valid settings");
    DropzoneState::new(Arc::new(settings)).expect("controllers build offline")
}
