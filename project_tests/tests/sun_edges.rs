//! # Sunrise and Sunset Integration Tests
//!
//! Polls the edge tracker across whole days with computed solar times and
//! checks the stale jump run reset that runs at sunrise.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, TimeZone};
use chrono_tz::America::New_York;
use lib_common::core::solar::sunrise_sunset;
use lib_common::core::sunwatch::SunEdgeTracker;
use lib_common::core::SourceChangeFlags;
use project_tests::{config_in, dropzone};

const LATITUDE: f64 = 42.57;
const LONGITUDE: f64 = -72.2885;

#[test]
fn each_edge_fires_once_per_day_under_polling() {
    let mut tracker = SunEdgeTracker::default();
    let start = New_York.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
    let end = start + Duration::days(2);

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut now = start;
    while now < end {
        let (sunrise, sunset) = sunrise_sunset(now.date_naive(), LATITUDE, LONGITUDE, New_York).unwrap();
        let flags = tracker.observe(now, sunrise, sunset);
        for (name, flag) in [
            ("sunrise", SourceChangeFlags::SUNRISE),
            ("sunset", SourceChangeFlags::SUNSET),
            ("pre_sunrise", SourceChangeFlags::PRE_SUNRISE),
            ("pre_sunset", SourceChangeFlags::PRE_SUNSET),
        ] {
            if flags.contains(flag) {
                *counts.entry(name).or_default() += 1;
            }
        }
        now += Duration::seconds(30);
    }

    assert_eq!(counts["sunrise"], 2);
    assert_eq!(counts["sunset"], 2);
    // One countdown tick per minute of the final hour, on each day.
    assert!((120..=122).contains(&counts["pre_sunrise"]), "{:?}", counts);
    assert!((120..=122).contains(&counts["pre_sunset"]), "{:?}", counts);
}

#[test]
fn sunrise_lands_on_the_local_calendar_day() {
    let date = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
    let (sunrise, sunset) = sunrise_sunset(date, LATITUDE, LONGITUDE, New_York).unwrap();
    assert_eq!(sunrise.date_naive(), date);
    assert_eq!(sunset.date_naive(), date);
    assert!(sunset - sunrise < Duration::hours(10));
}

#[test]
fn stale_jump_run_is_cleared_after_sunrise() {
    let dir = tempfile::tempdir().unwrap();
    let state = dropzone(config_in(dir.path()));
    let jumprun = state.jumprun().expect("jump run enabled");
    let values: HashMap<String, String> = [("main_heading".to_string(), "45".to_string())].into_iter().collect();
    jumprun.set_from_values(&values).unwrap();

    // Set after today's sunrise: kept.
    let now = state.current_time();
    assert!(!state.clear_stale_jumprun(now - Duration::hours(1), now + Duration::minutes(1)));
    assert!(jumprun.jumprun().is_set);

    // Set before a sunrise that has passed: cleared and persisted.
    assert!(state.clear_stale_jumprun(now + Duration::minutes(1), now + Duration::minutes(2)));
    assert!(!jumprun.jumprun().is_set);
    assert!(dir.path().join("jumprun.json").exists());
}
