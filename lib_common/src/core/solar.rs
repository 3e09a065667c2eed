//! # Solar Times
//!
//! Sunrise and sunset from the NOAA general solar position equations,
//! using the 90.833° zenith (refraction plus the solar disc radius).
//! Accuracy is about a minute at mid latitudes, plenty for a one-minute
//! countdown.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::f64::consts::PI;
use thiserror::Error;

const ZENITH_DEGREES: f64 = 90.833;

/// Errors raised while computing solar times.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolarError {
    /// Latitude or longitude is out of range or not a number.
    #[error("invalid coordinates: {0}, {1}")]
    InvalidCoordinates(f64, f64),

    /// The sun stays below the horizon all day.
    #[error("the sun does not rise on {0}")]
    PolarNight(NaiveDate),

    /// The sun stays above the horizon all day.
    #[error("the sun does not set on {0}")]
    MidnightSun(NaiveDate),

    /// No coordinates are known.
    #[error("location is unknown")]
    UnknownLocation,
}

/// # Sunrise And Sunset
///
/// Computes the sunrise and sunset instants for the local calendar `date`
/// at the given coordinates, expressed in `tz`.
pub fn sunrise_sunset(
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    tz: Tz,
) -> Result<(DateTime<Tz>, DateTime<Tz>), SolarError> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(SolarError::InvalidCoordinates(latitude, longitude));
    }

    // --- Phase 1: Fractional year at local noon, radians ---
    let gamma = 2.0 * PI / 365.0 * (date.ordinal0() as f64);

    // --- Phase 2: Equation of time (minutes) and declination (radians) ---
    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    // --- Phase 3: Hour angle of the zenith crossing ---
    let lat = latitude.to_radians();
    let cos_ha = ZENITH_DEGREES.to_radians().cos() / (lat.cos() * decl.cos()) - lat.tan() * decl.tan();
    if cos_ha > 1.0 {
        return Err(SolarError::PolarNight(date));
    }
    if cos_ha < -1.0 {
        return Err(SolarError::MidnightSun(date));
    }
    let ha = cos_ha.acos().to_degrees();

    // --- Phase 4: Minutes after UTC midnight of the same date ---
    let sunrise_minutes = 720.0 - 4.0 * (longitude + ha) - eqtime;
    let sunset_minutes = 720.0 - 4.0 * (longitude - ha) - eqtime;

    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    let at = |minutes: f64| {
        (midnight + ChronoDuration::seconds((minutes * 60.0).round() as i64)).with_timezone(&tz)
    };
    Ok((at(sunrise_minutes), at(sunset_minutes)))
}
