//! # Jump Run Controller
//!
//! Owns the current [`Jumprun`] behind a mutex, persists it to the state
//! file and notifies a callback (the `JUMPRUN` listeners) on every change.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::model::{Jumprun, Turn, MAX_TURNS};
use super::JumprunError;
use crate::configs::settings::{write_atomically, JumprunConfig};

/// Callback fired after the jump run changes.
pub type UpdateFn = Box<dyn Fn() + Send + Sync>;

/// # Jump Run Controller
pub struct JumprunController {
    state_file: PathBuf,
    update: Option<UpdateFn>,
    state: Mutex<Jumprun>,
}

impl JumprunController {
    /// Creates the controller, restoring the state file when possible.
    ///
    /// When the state file is missing or unreadable the jump run starts
    /// unset at the configured origin.
    pub fn new(config: &JumprunConfig, update: Option<UpdateFn>) -> Self {
        let controller = Self {
            state_file: config.state_file.clone(),
            update,
            state: Mutex::new(Jumprun {
                timestamp: chrono::Utc::now().timestamp(),
                latitude: config.latitude.clone(),
                longitude: config.longitude.clone(),
                magnetic_declination: config.magnetic_declination,
                camera_height: config.camera_height,
                ..Default::default()
            }),
        };
        if let Err(e) = controller.restore() {
            log::warn!(
                "cannot restore jumprun state from {}: {}",
                controller.state_file.display(),
                e
            );
        }
        controller
    }

    /// A copy of the current jump run.
    pub fn jumprun(&self) -> Jumprun {
        self.lock().clone()
    }

    /// Clears the jump run and stamps the reset time.
    pub fn reset(&self) {
        {
            let mut j = self.lock();
            j.timestamp = chrono::Utc::now().timestamp();
            j.is_set = false;
        }
        self.notify();
    }

    /// # Set From Values
    ///
    /// Replaces the jump run from submitted form values. Blank fields take
    /// zero, except the origin fields which keep their current values.
    ///
    /// ## Validation:
    /// - headings must be within 0..=359
    /// - every integer field must parse
    /// - coordinates must parse as decimal degrees
    /// - hook turns stop at the first blank heading; each needs a distance
    /// - parallel offsets stop at the first blank; zeros and duplicates are dropped
    ///
    /// Nothing is changed when any value is rejected.
    pub fn set_from_values(&self, values: &HashMap<String, String>) -> Result<(), JumprunError> {
        let current = self.jumprun();
        let mut j = Jumprun {
            timestamp: chrono::Utc::now().timestamp(),
            is_set: true,
            ..Default::default()
        };

        j.heading = heading(values, "main_heading")?;
        j.exit_distance = int(values, "exit_distance", 0)?;
        j.offset_heading = int(values, "offset_heading", 0)?;
        j.offset_distance = int(values, "offset_distance", 0)?;
        j.magnetic_declination = int(values, "magnetic_declination", current.magnetic_declination)?;
        j.camera_height = int(values, "camera_height", current.camera_height)?;
        j.latitude = coordinate(values, "latitude", &current.latitude)?;
        j.longitude = coordinate(values, "longitude", &current.longitude)?;

        for i in 0..MAX_TURNS {
            let key = format!("hook_heading_{}", i);
            if blank(values, &key) {
                break;
            }
            j.hook_turns[i] = Turn {
                heading: heading(values, &key)?,
                distance: required_int(values, &format!("hook_distance_{}", i))?,
            };
        }

        let mut count = 0;
        for i in 0..MAX_TURNS {
            let key = format!("parallel_offset_{}", i);
            if blank(values, &key) {
                break;
            }
            let offset = required_int(values, &key)?;
            if offset == 0 || j.offsets[..count].contains(&offset) {
                continue;
            }
            j.offsets[count] = offset;
            count += 1;
        }

        *self.lock() = j;
        self.notify();
        Ok(())
    }

    /// Persists the jump run to the state file.
    pub fn write(&self) -> Result<(), JumprunError> {
        let j = self.jumprun();
        let bytes = serde_json::to_vec(&j)?;
        write_atomically(&self.state_file, &bytes)?;
        Ok(())
    }

    /// Replaces the jump run with the contents of the state file.
    pub fn restore(&self) -> Result<(), JumprunError> {
        let bytes = fs::read(&self.state_file)?;
        let j: Jumprun = serde_json::from_slice(&bytes)?;
        *self.lock() = j;
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        if let Some(update) = &self.update {
            update();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Jumprun> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn blank(values: &HashMap<String, String>, key: &str) -> bool {
    values.get(key).is_none_or(|v| v.trim().is_empty())
}

fn parse_i32(key: &str, value: &str) -> Result<i32, JumprunError> {
    value.trim().parse().map_err(|_| JumprunError::Parse {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn int(values: &HashMap<String, String>, key: &str, default: i32) -> Result<i32, JumprunError> {
    match values.get(key) {
        Some(v) if !v.trim().is_empty() => parse_i32(key, v),
        _ => Ok(default),
    }
}

fn required_int(values: &HashMap<String, String>, key: &str) -> Result<i32, JumprunError> {
    parse_i32(key, values.get(key).map(String::as_str).unwrap_or_default())
}

fn heading(values: &HashMap<String, String>, key: &str) -> Result<i32, JumprunError> {
    let v = int(values, key, 0)?;
    if !(0..=359).contains(&v) {
        return Err(JumprunError::OutOfRange {
            key: key.to_string(),
            value: i64::from(v),
        });
    }
    Ok(v)
}

fn coordinate(values: &HashMap<String, String>, key: &str, default: &str) -> Result<String, JumprunError> {
    match values.get(key).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => {
            v.parse::<f64>().map_err(|_| JumprunError::Parse {
                key: key.to_string(),
                value: v.to_string(),
            })?;
            Ok(v.to_string())
        }
        _ => Ok(default.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn config(dir: &tempfile::TempDir) -> JumprunConfig {
        JumprunConfig {
            enabled: true,
            state_file: dir.path().join("jumprun.json"),
            ..Default::default()
        }
    }

    #[test]
    fn missing_state_file_starts_unset_at_the_default_origin() {
        let dir = tempfile::tempdir().unwrap();
        let c = JumprunController::new(&config(&dir), None);
        let j = c.jumprun();
        assert!(!j.is_set);
        assert_eq!(j.latitude, "42.5700");
        assert_eq!(j.origin(), None);
    }

    #[test]
    fn set_validates_and_collects_turns_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let c = JumprunController::new(
            &config(&dir),
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        c.set_from_values(&values(&[
            ("main_heading", "240"),
            ("exit_distance", "-3"),
            ("hook_heading_0", "270"),
            ("hook_distance_0", "5"),
            ("hook_heading_1", ""),
            ("hook_heading_2", "90"),
            ("hook_distance_2", "1"),
            ("parallel_offset_0", "2"),
            ("parallel_offset_1", "0"),
            ("parallel_offset_2", "2"),
            ("parallel_offset_3", "-2"),
        ]))
        .unwrap();

        let j = c.jumprun();
        assert!(j.is_set);
        assert_eq!(j.heading, 240);
        assert_eq!(j.exit_distance, -3);
        assert_eq!(j.turns().count(), 1);
        assert_eq!(j.parallel_offsets().collect::<Vec<_>>(), vec![2, -2]);
        assert_eq!(j.origin(), Some((42.57, -72.2885)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejected_values_leave_the_run_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let c = JumprunController::new(&config(&dir), None);
        assert!(matches!(
            c.set_from_values(&values(&[("main_heading", "360")])),
            Err(JumprunError::OutOfRange { .. })
        ));
        assert!(c.set_from_values(&values(&[("latitude", "north")])).is_err());
        assert!(c.set_from_values(&values(&[("hook_heading_0", "10")])).is_err());
        assert!(!c.jumprun().is_set);
    }

    #[test]
    fn write_then_restore_round_trips_through_the_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let c = JumprunController::new(&config(&dir), None);
        c.set_from_values(&values(&[("main_heading", "10")])).unwrap();
        c.write().unwrap();

        let restored = JumprunController::new(&config(&dir), None);
        assert_eq!(restored.jumprun(), c.jumprun());

        restored.reset();
        assert!(!restored.jumprun().is_set);
    }
}
