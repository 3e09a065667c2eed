//! # Manifest Settings
//!
//! Loads the static configuration of the manifest server from a JSON file
//! and exposes it through typed accessors. Every field has a default, so a
//! partial file (or no file at all) still yields a usable configuration.
//!
//! ## Layers:
//! - **`SettingsConfig`**: the deserialized file. Immutable once loaded.
//! - **`Options`**: runtime display options behind a mutex, restored from and
//!   persisted to `options_file`.
//!
//! The server binary layers CLI and environment overrides on top of the file
//! before calling [`Settings::new`].

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use super::options::Options;

/// Errors raised while loading or persisting settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings or options file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings or options file is not valid JSON for its schema.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured time zone is not a known IANA zone.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Burble manifest feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurbleConfig {
    /// Burble dropzone id.
    pub dzid: i64,
    /// Base URL of the Burble DZM front end.
    pub base_url: String,
    /// Jump labels that mark a sport jumper as a group organizer.
    pub organizer_strings: Vec<String>,
    /// Seconds between manifest refreshes.
    pub refresh_secs: u64,
}

impl Default for BurbleConfig {
    fn default() -> Self {
        Self {
            dzid: 417,
            base_url: "https://dzm.burblesoft.com".to_string(),
            organizer_strings: Vec::new(),
            refresh_secs: 10,
        }
    }
}

/// METAR surface weather settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetarConfig {
    /// Whether the weather source runs at all.
    pub enabled: bool,
    /// ICAO station identifier.
    pub station: String,
    /// CSV endpoint; `&stationString=<station>` is appended.
    pub url: String,
    /// Degrees added to true wind direction to get magnetic.
    pub magnetic_declination: i64,
    /// Seconds between weather refreshes.
    pub refresh_secs: u64,
}

impl Default for MetarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            station: "KORE".to_string(),
            url: "https://aviationweather.gov/adds/dataserver_current/httpparam?datasource=metars&requesttype=retrieve&format=csv&hoursBeforeNow=24&mostRecent=true".to_string(),
            magnetic_declination: -14,
            refresh_secs: 300,
        }
    }
}

/// Winds aloft forecast settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindsConfig {
    /// Whether the winds aloft source runs at all.
    pub enabled: bool,
    /// Forecast latitude, decimal degrees.
    pub latitude: String,
    /// Forecast longitude, decimal degrees.
    pub longitude: String,
    /// Forecast endpoint; `&lat=..&lon=..` is appended.
    pub url: String,
    /// Seconds between winds aloft refreshes.
    pub refresh_secs: u64,
}

impl Default for WindsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latitude: "42.5700".to_string(),
            longitude: "-72.2885".to_string(),
            url: "https://markschulze.net/winds/winds.php?hourOffset=0".to_string(),
            refresh_secs: 900,
        }
    }
}

/// Jump run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumprunConfig {
    /// Whether the jump run path is managed at all.
    pub enabled: bool,
    /// Default origin latitude.
    pub latitude: String,
    /// Default origin longitude.
    pub longitude: String,
    /// Default magnetic declination at the origin.
    pub magnetic_declination: i32,
    /// Default camera height in feet.
    pub camera_height: i32,
    /// Where the current jump run is persisted.
    pub state_file: PathBuf,
}

impl Default for JumprunConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            latitude: "42.5700".to_string(),
            longitude: "-72.2885".to_string(),
            magnetic_declination: -14,
            camera_height: 0,
            state_file: PathBuf::from("/var/lib/manifest-server/jumprun.json"),
        }
    }
}

/// The deserialized settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// IANA time zone of the dropzone.
    pub timezone: String,
    /// Where runtime options are persisted. `None` keeps them in memory only.
    pub options_file: Option<PathBuf>,
    /// Per-request timeout for every upstream fetch, in seconds.
    pub request_timeout_secs: u64,
    /// User agent presented to upstream feeds.
    pub user_agent: String,
    /// Manifest feed.
    pub burble: BurbleConfig,
    /// Surface weather feed.
    pub metar: MetarConfig,
    /// Winds aloft feed.
    pub winds: WindsConfig,
    /// Jump run path.
    pub jumprun: JumprunConfig,
    /// Initial runtime options, used when no options file exists.
    pub options: Options,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            options_file: None,
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Safari/605.1.15".to_string(),
            burble: BurbleConfig::default(),
            metar: MetarConfig::default(),
            winds: WindsConfig::default(),
            jumprun: JumprunConfig::default(),
            options: Options::default(),
        }
    }
}

/// # Settings
///
/// Shared, read-mostly configuration handed to every controller as an
/// `Arc<Settings>`. Only the runtime [`Options`] are mutable.
#[derive(Debug)]
pub struct Settings {
    config: SettingsConfig,
    location: Tz,
    options: Mutex<Options>,
}

impl Settings {
    /// Builds settings from an already-merged configuration.
    ///
    /// Validates the time zone and restores runtime options from
    /// `options_file` when it exists. A missing or unreadable options file
    /// is logged and the configured defaults are used.
    pub fn new(config: SettingsConfig) -> Result<Self, SettingsError> {
        let location: Tz = config
            .timezone
            .parse()
            .map_err(|e| SettingsError::InvalidTimezone(format!("{}: {}", config.timezone, e)))?;

        let settings = Self {
            options: Mutex::new(config.options.clone()),
            location,
            config,
        };
        if let Some(path) = &settings.config.options_file {
            if path.exists() {
                if let Err(e) = settings.restore_options() {
                    log::warn!("Could not read options from {}: {}", path.display(), e);
                }
            }
        }
        Ok(settings)
    }

    /// Reads a JSON settings file and builds settings from it.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        let config: SettingsConfig = serde_json::from_str(&text)?;
        Self::new(config)
    }

    /// The raw configuration.
    pub fn config(&self) -> &SettingsConfig {
        &self.config
    }

    /// The dropzone time zone.
    pub fn location(&self) -> Tz {
        self.location
    }

    /// Per-request timeout for upstream fetches.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs.max(1))
    }

    /// Burble dropzone id.
    pub fn burble_dropzone_id(&self) -> i64 {
        self.config.burble.dzid
    }

    /// Lowercased organizer labels; `["organizer"]` when none are configured.
    pub fn organizer_strings(&self) -> Vec<String> {
        if self.config.burble.organizer_strings.is_empty() {
            return vec!["organizer".to_string()];
        }
        self.config
            .burble
            .organizer_strings
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    }

    /// Number of load columns to display.
    pub fn display_columns(&self) -> usize {
        self.lock_options().display_columns
    }

    /// Minimum call minutes for a load to be displayed.
    pub fn min_call_minutes(&self) -> i64 {
        self.lock_options().min_call_minutes
    }

    /// Whether the METAR source is enabled.
    pub fn metar_enabled(&self) -> bool {
        self.config.metar.enabled
    }

    /// Whether the winds aloft source is enabled.
    pub fn winds_enabled(&self) -> bool {
        self.config.winds.enabled
    }

    /// Whether the jump run path is managed.
    pub fn jumprun_enabled(&self) -> bool {
        self.config.jumprun.enabled
    }

    /// Configured winds aloft latitude.
    pub fn winds_latitude(&self) -> &str {
        &self.config.winds.latitude
    }

    /// Configured winds aloft longitude.
    pub fn winds_longitude(&self) -> &str {
        &self.config.winds.longitude
    }

    /// A copy of the current runtime options.
    pub fn options(&self) -> Options {
        self.lock_options().clone()
    }

    /// Applies key/value updates to the runtime options.
    ///
    /// # Returns
    /// `true` when anything changed.
    pub fn set_options_from_values(&self, values: &HashMap<String, String>) -> bool {
        self.lock_options().apply_values(values)
    }

    /// Sets the fuel-requested flag, returning `true` if it changed.
    pub fn set_fuel_requested(&self, requested: bool) -> bool {
        let mut options = self.lock_options();
        let changed = options.fuel_requested != requested;
        options.fuel_requested = requested;
        changed
    }

    /// Persists the runtime options to `options_file`.
    ///
    /// A no-op when no options file is configured.
    pub fn write_options(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.config.options_file else {
            return Ok(());
        };
        let options = self.options();
        let bytes = serde_json::to_vec(&options)?;
        write_atomically(path, &bytes)?;
        Ok(())
    }

    /// Replaces the runtime options with the contents of `options_file`.
    ///
    /// Fields missing from the file keep their defaults.
    pub fn restore_options(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.config.options_file else {
            return Ok(());
        };
        let text = fs::read_to_string(path)?;
        let restored: Options = serde_json::from_str(&text)?;
        *self.lock_options() = restored;
        Ok(())
    }

    fn lock_options(&self) -> std::sync::MutexGuard<'_, Options> {
        self.options.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
///
/// Readers never observe a half-written file.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: SettingsConfig =
            serde_json::from_str(r#"{ "burble": { "dzid": 12 }, "winds": { "enabled": false } }"#).unwrap();
        let settings = Settings::new(config).unwrap();
        assert_eq!(settings.burble_dropzone_id(), 12);
        assert!(!settings.winds_enabled());
        assert!(settings.metar_enabled());
        assert_eq!(settings.config().metar.station, "KORE");
        assert_eq!(settings.display_columns(), 5);
    }

    #[test]
    fn organizer_strings_default_and_lowercase() {
        let settings = Settings::new(SettingsConfig::default()).unwrap();
        assert_eq!(settings.organizer_strings(), vec!["organizer".to_string()]);

        let mut config = SettingsConfig::default();
        config.burble.organizer_strings = vec!["LO".to_string(), " Organizer ".to_string()];
        let settings = Settings::new(config).unwrap();
        assert_eq!(settings.organizer_strings(), vec!["lo".to_string(), "organizer".to_string()]);
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let mut config = SettingsConfig::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(Settings::new(config), Err(SettingsError::InvalidTimezone(_))));
    }

    #[test]
    fn options_survive_a_write_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SettingsConfig::default();
        config.options_file = Some(dir.path().join("options.json"));

        let settings = Settings::new(config.clone()).unwrap();
        let mut values = HashMap::new();
        values.insert("message".to_string(), "Hold for weather".to_string());
        assert!(settings.set_options_from_values(&values));
        assert!(settings.set_fuel_requested(true));
        settings.write_options().unwrap();

        let reloaded = Settings::new(config).unwrap();
        assert_eq!(reloaded.options().message, "Hold for weather");
        assert!(reloaded.options().fuel_requested);
    }
}
