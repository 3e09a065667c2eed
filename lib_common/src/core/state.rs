//! # Aggregate State Store
//!
//! Holds one controller per source, each guarding its latest value with its
//! own mutex. Readers get a consistent copy of a single source; there is no
//! cross-source atomicity. Also derives the views that combine sources
//! (coordinates, jump separation, sunrise/sunset countdowns) and owns the
//! listener registry through which change flags reach the distributor.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::flags::SourceChangeFlags;
use super::scheduler::spawn_source;
use super::solar::{sunrise_sunset, SolarError};
use super::sunwatch;
use crate::configs::Settings;
use crate::feeds::burble::BurbleController;
use crate::feeds::metar::{fahrenheit_from_celsius, MetarController};
use crate::feeds::winds::WindsController;
use crate::feeds::FeedError;
use crate::jumprun::JumprunController;

/// Default color for display strings.
pub const WHITE: u32 = 0xffffff;
/// Color of the separation string when winds exceed jump run speed.
pub const RED: u32 = 0xff0000;

const SEPARATION_ALTITUDE_INDEX: usize = 13;
const JUMP_RUN_AIRSPEED_KNOTS: i64 = 85;

/// # Listener Registry
///
/// Change-flag subscribers keyed by a monotonically increasing id.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    inner: Mutex<Listeners>,
}

#[derive(Debug, Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<SourceChangeFlags>>,
}

impl ListenerRegistry {
    /// Registers a listener and returns its id.
    pub fn add(&self, sender: mpsc::UnboundedSender<SourceChangeFlags>) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.senders.insert(id, sender);
        id
    }

    /// Removes a listener. Unknown ids are ignored.
    pub fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.senders.remove(&id);
    }

    /// Sends `flags` to every listener, dropping listeners whose receiver is gone.
    pub fn wake(&self, flags: SourceChangeFlags) {
        if flags.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.senders.retain(|id, sender| {
            let alive = sender.send(flags).is_ok();
            if !alive {
                log::debug!("Listener {} dropped", id);
            }
            alive
        });
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).senders.len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// # Dropzone State
///
/// The aggregate of every source. Optional sources are `None` when disabled
/// in the settings.
pub struct DropzoneState {
    settings: Arc<Settings>,
    burble: BurbleController,
    metar: Option<MetarController>,
    winds: Option<WindsController>,
    jumprun: Option<JumprunController>,
    listeners: Arc<ListenerRegistry>,
}

impl DropzoneState {
    /// # New
    ///
    /// Builds the controllers for every enabled source. No network traffic
    /// happens until [`DropzoneState::start`].
    pub fn new(settings: Arc<Settings>) -> Result<Arc<Self>, FeedError> {
        let listeners = Arc::new(ListenerRegistry::default());

        let burble = BurbleController::new(Arc::clone(&settings))?;
        let metar = if settings.metar_enabled() {
            Some(MetarController::new(Arc::clone(&settings))?)
        } else {
            None
        };
        let winds = if settings.winds_enabled() {
            Some(WindsController::new(Arc::clone(&settings))?)
        } else {
            None
        };
        let jumprun = settings.jumprun_enabled().then(|| {
            let registry = Arc::clone(&listeners);
            JumprunController::new(
                &settings.config().jumprun,
                Some(Box::new(move || registry.wake(SourceChangeFlags::JUMPRUN))),
            )
        });

        Ok(Arc::new(Self {
            settings,
            burble,
            metar,
            winds,
            jumprun,
            listeners,
        }))
    }

    /// # Start
    ///
    /// Spawns one refresh task per enabled source plus the sunrise/sunset
    /// watcher. Every task stops when `cancel` fires.
    pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let config = self.settings.config();
        let mut handles = Vec::new();

        let state = Arc::clone(self);
        let registry = Arc::clone(&self.listeners);
        handles.push(spawn_source(
            "Burble",
            move || {
                let state = Arc::clone(&state);
                async move { state.burble.refresh().await }
            },
            cadence(config.burble.refresh_secs),
            move || registry.wake(SourceChangeFlags::BURBLE),
            cancel.clone(),
        ));

        if self.metar.is_some() {
            let state = Arc::clone(self);
            let registry = Arc::clone(&self.listeners);
            handles.push(spawn_source(
                "METAR",
                move || {
                    let state = Arc::clone(&state);
                    async move {
                        match &state.metar {
                            Some(metar) => metar.refresh().await,
                            None => Ok(false),
                        }
                    }
                },
                cadence(config.metar.refresh_secs),
                move || registry.wake(SourceChangeFlags::METAR),
                cancel.clone(),
            ));
        }

        if self.winds.is_some() {
            let state = Arc::clone(self);
            let registry = Arc::clone(&self.listeners);
            handles.push(spawn_source(
                "Winds Aloft",
                move || {
                    let state = Arc::clone(&state);
                    async move {
                        match &state.winds {
                            Some(winds) => winds.refresh().await,
                            None => Ok(false),
                        }
                    }
                },
                cadence(config.winds.refresh_secs),
                move || registry.wake(SourceChangeFlags::WINDS_ALOFT),
                cancel.clone(),
            ));
        }

        handles.push(tokio::spawn(sunwatch::run(Arc::clone(self), cancel.clone())));
        handles
    }

    /// Shared settings.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// The manifest source.
    pub fn burble(&self) -> &BurbleController {
        &self.burble
    }

    /// The weather source, when enabled.
    pub fn metar(&self) -> Option<&MetarController> {
        self.metar.as_ref()
    }

    /// The winds aloft source, when enabled.
    pub fn winds(&self) -> Option<&WindsController> {
        self.winds.as_ref()
    }

    /// The jump run, when enabled.
    pub fn jumprun(&self) -> Option<&JumprunController> {
        self.jumprun.as_ref()
    }

    /// Registers a change listener.
    pub fn add_listener(&self, sender: mpsc::UnboundedSender<SourceChangeFlags>) -> u64 {
        self.listeners.add(sender)
    }

    /// Removes a change listener.
    pub fn remove_listener(&self, id: u64) {
        self.listeners.remove(id)
    }

    /// Notifies every listener that `flags` changed.
    pub fn wake(&self, flags: SourceChangeFlags) {
        self.listeners.wake(flags)
    }

    /// The dropzone's wall-clock time.
    pub fn current_time(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.settings.location())
    }

    /// # Coordinates
    ///
    /// The best known location, in order of preference:
    /// 1. the jump run origin, when a run is set
    /// 2. the winds aloft coordinates, when that source is enabled
    /// 3. the weather station coordinates
    pub fn coordinates(&self) -> Result<(f64, f64), SolarError> {
        if let Some(origin) = self.jumprun.as_ref().and_then(|j| j.jumprun().origin()) {
            return Ok(origin);
        }
        if self.winds.is_some() {
            let lat = self.settings.winds_latitude().trim().parse::<f64>();
            let lon = self.settings.winds_longitude().trim().parse::<f64>();
            if let (Ok(lat), Ok(lon)) = (lat, lon) {
                return Ok((lat, lon));
            }
        }
        self.metar
            .as_ref()
            .and_then(MetarController::location)
            .ok_or(SolarError::UnknownLocation)
    }

    /// Sunrise and sunset on the local date of `now`.
    pub fn sunrise_and_sunset_at(&self, now: DateTime<Tz>) -> Result<(DateTime<Tz>, DateTime<Tz>), SolarError> {
        let (latitude, longitude) = self.coordinates()?;
        sunrise_sunset(now.date_naive(), latitude, longitude, self.settings.location())
    }

    /// Today's sunrise and sunset.
    pub fn sunrise_and_sunset_times(&self) -> Result<(DateTime<Tz>, DateTime<Tz>), SolarError> {
        self.sunrise_and_sunset_at(self.current_time())
    }

    /// Sunrise countdown at `now`, empty outside the final hour.
    pub fn sunrise_message_at(&self, now: DateTime<Tz>) -> String {
        match self.sunrise_and_sunset_at(now) {
            Ok((sunrise, _)) => countdown_message("Sunrise", now, sunrise),
            Err(_) => String::new(),
        }
    }

    /// Sunset countdown at `now`, empty outside the final hour.
    pub fn sunset_message_at(&self, now: DateTime<Tz>) -> String {
        match self.sunrise_and_sunset_at(now) {
            Ok((_, sunset)) => countdown_message("Sunset", now, sunset),
            Err(_) => String::new(),
        }
    }

    /// Current sunrise countdown.
    pub fn sunrise_message(&self) -> String {
        self.sunrise_message_at(self.current_time())
    }

    /// Current sunset countdown.
    pub fn sunset_message(&self) -> String {
        self.sunset_message_at(self.current_time())
    }

    /// # Separation Strings
    ///
    /// Exit separation from the 13000 ft winds at jump run airspeed, plus the
    /// temperature at that altitude.
    ///
    /// # Returns
    /// `(color, text)`; the color is red when the winds reach jump run
    /// airspeed. The text is empty when the forecast is too short.
    pub fn separation_strings(&self) -> (u32, String) {
        let Some(winds) = &self.winds else {
            return (WHITE, String::new());
        };
        let samples = winds.samples();
        let Some(sample) = samples.get(SEPARATION_ALTITUDE_INDEX) else {
            return (WHITE, String::new());
        };

        let speed = if sample.light_and_variable {
            JUMP_RUN_AIRSPEED_KNOTS
        } else {
            JUMP_RUN_AIRSPEED_KNOTS - sample.speed
        };
        let (color, text) = if speed <= 0 {
            (RED, format!("Winds are {} knots", sample.speed))
        } else {
            (WHITE, format!("Separation is {} seconds", separation_delay(speed)))
        };
        let temperature = format!(
            "({}℃ / {}℉)",
            sample.temperature,
            fahrenheit_from_celsius(sample.temperature as f64) as i64
        );
        (color, format!("{} {}", text, temperature))
    }

    /// # Clear Stale Jump Run
    ///
    /// Resets and persists the jump run when it was last set before
    /// `sunrise` and `now` is past it.
    ///
    /// # Returns
    /// `true` when the run was reset.
    pub fn clear_stale_jumprun(&self, sunrise: DateTime<Tz>, now: DateTime<Tz>) -> bool {
        let Some(jumprun) = &self.jumprun else {
            return false;
        };
        let Some(set_at) = Utc.timestamp_opt(jumprun.jumprun().timestamp, 0).single() else {
            return false;
        };
        let set_at = set_at.with_timezone(&self.settings.location());
        if set_at >= sunrise || now <= sunrise {
            return false;
        }
        log::info!("Clearing jump run set at {}", set_at);
        jumprun.reset();
        if let Err(e) = jumprun.write() {
            log::error!("cannot save jumprun state: {}", e);
        }
        true
    }
}

fn cadence(secs: u64) -> impl Fn() -> Duration + Send + 'static {
    let period = Duration::from_secs(secs.max(1));
    move || period
}

/// Seconds between exits for a ground speed in knots, assuming 1000 ft of
/// horizontal separation.
pub fn separation_delay(speed_knots: i64) -> i64 {
    let meters_per_second = 1852.0 * speed_knots as f64 / 3600.0;
    let feet_per_second = meters_per_second / 0.3048;
    (1000.0 / feet_per_second).ceil() as i64
}

/// # Countdown Message
///
/// `"{label} is in N minutes"` during the final hour before `edge`, using
/// whole elapsed minutes; empty otherwise.
pub fn countdown_message(label: &str, now: DateTime<Tz>, edge: DateTime<Tz>) -> String {
    if now >= edge {
        return String::new();
    }
    match (edge - now).num_minutes() {
        1 => format!("{} is in 1 minute", label),
        60 => format!("{} is in 1 hour", label),
        n @ 2..=59 => format!("{} is in {} minutes", label, n),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::SettingsConfig;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn state(config: SettingsConfig) -> Arc<DropzoneState> {
        DropzoneState::new(Arc::new(Settings::new(config).unwrap())).unwrap()
    }

    fn winds_with_13k(speed: i64, temp: i64) -> serde_json::Value {
        let mut direction = serde_json::Map::new();
        let mut speeds = serde_json::Map::new();
        let mut temps = serde_json::Map::new();
        for i in 0..=14 {
            let key = (i * 1000).to_string();
            direction.insert(key.clone(), json!(270));
            speeds.insert(key.clone(), json!(if i == 13 { speed } else { 10 }));
            temps.insert(key, json!(temp));
        }
        json!({ "validtime": 12, "direction": direction, "speed": speeds, "temp": temps })
    }

    #[test]
    fn separation_follows_the_13k_winds() {
        let s = state(SettingsConfig::default());
        let winds = s.winds().unwrap();

        assert_eq!(s.separation_strings(), (WHITE, String::new()));

        winds.apply_payload(&winds_with_13k(25, -10), Utc::now()).unwrap();
        assert_eq!(separation_delay(60), 10);
        assert_eq!(s.separation_strings(), (WHITE, "Separation is 10 seconds (-10℃ / 14℉)".to_string()));

        winds.apply_payload(&winds_with_13k(90, -10), Utc::now()).unwrap();
        assert_eq!(s.separation_strings(), (RED, "Winds are 90 knots (-10℃ / 14℉)".to_string()));
    }

    #[test]
    fn countdown_wording() {
        let tz = chrono_tz::America::New_York;
        let edge = tz.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let before = |secs: i64| edge - ChronoDuration::seconds(secs);
        assert_eq!(countdown_message("Sunset", before(90), edge), "Sunset is in 1 minute");
        assert_eq!(countdown_message("Sunset", before(30 * 60 + 5), edge), "Sunset is in 30 minutes");
        assert_eq!(countdown_message("Sunset", before(3600), edge), "Sunset is in 1 hour");
        assert_eq!(countdown_message("Sunset", before(30), edge), "");
        assert_eq!(countdown_message("Sunset", before(2 * 3600), edge), "");
        assert_eq!(countdown_message("Sunset", edge, edge), "");
    }

    #[test]
    fn coordinates_prefer_winds_then_station() {
        let s = state(SettingsConfig::default());
        assert_eq!(s.coordinates().unwrap(), (42.57, -72.2885));

        let mut config = SettingsConfig::default();
        config.winds.enabled = false;
        config.metar.enabled = false;
        assert_eq!(state(config).coordinates(), Err(SolarError::UnknownLocation));
    }

    #[test]
    fn listeners_receive_flags_until_dropped() {
        let registry = ListenerRegistry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.add(tx);
        registry.wake(SourceChangeFlags::METAR);
        assert_eq!(rx.try_recv().unwrap(), SourceChangeFlags::METAR);

        drop(rx);
        registry.wake(SourceChangeFlags::BURBLE);
        assert!(registry.is_empty());
        registry.remove(id);
    }
}
