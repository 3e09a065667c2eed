//! # Sunrise/Sunset Watch
//!
//! Polls the wall clock once a second and raises:
//! - `SUNRISE` / `SUNSET` once per calendar day, as soon as the edge has passed
//! - `PRE_SUNRISE` / `PRE_SUNSET` once per minute during the hour before an edge
//!
//! The sunrise edge also clears a jump run left over from the previous day.
//! When no coordinates are known yet the tick is skipped and retried, so a
//! jump run origin configured later brings the watch to life.

use chrono::{DateTime, NaiveDate, Timelike};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::flags::SourceChangeFlags;
use super::state::DropzoneState;

/// # Sun Edge Tracker
///
/// Remembers which edges and pre-event minutes already fired.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SunEdgeTracker {
    last_pre: Option<(u32, u32)>,
    last_sunrise: Option<NaiveDate>,
    last_sunset: Option<NaiveDate>,
}

impl SunEdgeTracker {
    /// # Observe
    ///
    /// Compares `now` with today's `sunrise` and `sunset` and returns the
    /// flags that should fire on this tick. Pre-sunrise and pre-sunset
    /// share one per-minute marker.
    pub fn observe(&mut self, now: DateTime<Tz>, sunrise: DateTime<Tz>, sunset: DateTime<Tz>) -> SourceChangeFlags {
        let mut flags = SourceChangeFlags::empty();
        let minute = (now.hour(), now.minute());

        if now >= sunset {
            let day = sunset.date_naive();
            if self.last_sunset != Some(day) {
                self.last_sunset = Some(day);
                flags |= SourceChangeFlags::SUNSET;
            }
        } else if (sunset - now).num_seconds() <= 3600 && self.last_pre != Some(minute) {
            self.last_pre = Some(minute);
            flags |= SourceChangeFlags::PRE_SUNSET;
        }

        if now >= sunrise {
            let day = sunrise.date_naive();
            if self.last_sunrise != Some(day) {
                self.last_sunrise = Some(day);
                flags |= SourceChangeFlags::SUNRISE;
            }
        } else if (sunrise - now).num_seconds() <= 3600 && self.last_pre != Some(minute) {
            self.last_pre = Some(minute);
            flags |= SourceChangeFlags::PRE_SUNRISE;
        }

        flags
    }
}

/// # Run
///
/// The once-a-second watch loop. Exits when `cancel` fires.
pub async fn run(state: Arc<DropzoneState>, cancel: CancellationToken) {
    let mut tracker = SunEdgeTracker::default();
    let mut last_error: Option<String> = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = state.current_time();
        let (sunrise, sunset) = match state.sunrise_and_sunset_at(now) {
            Ok(times) => {
                last_error = None;
                times
            }
            Err(e) => {
                let message = e.to_string();
                if last_error.as_deref() != Some(message.as_str()) {
                    log::warn!("Sunrise/sunset unavailable, retrying: {}", message);
                    last_error = Some(message);
                }
                continue;
            }
        };

        let flags = tracker.observe(now, sunrise, sunset);
        if flags.contains(SourceChangeFlags::SUNRISE) {
            log::info!("Sunrise at {}", sunrise.format("%H:%M:%S"));
            state.clear_stale_jumprun(sunrise, now);
        }
        if flags.contains(SourceChangeFlags::SUNSET) {
            log::info!("Sunset at {}", sunset.format("%H:%M:%S"));
        }
        state.wake(flags);
    }
    log::info!("Sunrise/sunset watch stopped");
}
