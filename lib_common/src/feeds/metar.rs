//! # METAR Surface Weather
//!
//! Parses the aviation weather CSV response for one station and derives the
//! human-readable strings shown in the status panel: wind conditions, sky
//! cover, present weather and temperature.
//!
//! ## Response layout:
//! - lines 0..=3: status chatter ("No errors", timings, data source)
//! - line 4: `"<n> results"`
//! - line 5: comma separated column names
//! - last line: the most recent observation

use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::configs::Settings;
use crate::feeds::{into_body, FeedError};
use crate::retrieve::ky_http::{ApiClient, ClientOptions};

const CARDINAL_DIRECTIONS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW", "NNW",
];

/// Converts Celsius to Fahrenheit.
pub fn fahrenheit_from_celsius(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Converts knots to miles per hour.
pub fn mph_from_knots(kts: f64) -> f64 {
    kts * 1.151
}

/// The 16-point compass name for a heading in degrees.
pub fn cardinal_direction(degrees: f64) -> &'static str {
    let n = ((degrees.rem_euclid(360.0) + 11.25).rem_euclid(360.0) / 22.5).floor() as usize;
    CARDINAL_DIRECTIONS[n % CARDINAL_DIRECTIONS.len()]
}

fn descriptor(code: &str) -> Option<&'static str> {
    Some(match code {
        "MI" => "shallow ",
        "PR" => "partial ",
        "BC" => "patches of ",
        "DR" => "low drifting ",
        "BL" => "blowing ",
        "SH" => "showers ",
        "TS" => "thunderstorm ",
        "FZ" => "freezing ",
        _ => return None,
    })
}

fn condition(code: &str) -> Option<&'static str> {
    Some(match code {
        "RA" => "rain",
        "DZ" => "drizzle",
        "SN" => "snow",
        "SG" => "snow grains",
        "IC" => "ice crystals",
        "PL" => "ice pellets",
        "GR" => "hail",
        "GS" => "small hail and/or snow pellets",
        "FG" => "fog",
        "VA" => "volcanic ash",
        "BR" => "mist",
        "HZ" => "haze",
        "DU" => "widespread dust",
        "FU" => "smoke",
        "SA" => "sand",
        "PY" => "spray",
        "SQ" => "squall",
        "PO" => "dust or sand whirls",
        "DS" => "dust storm",
        "SS" => "sandstorm",
        "FC" => "funnel cloud",
        "UP" => "unknown precipitation",
        _ => return None,
    })
}

/// # Weather Condition
///
/// Decodes a space separated `wx_string` ("-RA BR", "VC TS", "+SHSN") into
/// readable text. Unknown tokens are skipped; nothing recognized reads as
/// `"clear"`.
pub fn weather_condition(wx: &str) -> String {
    let parts: Vec<&str> = wx.split_whitespace().collect();
    let mut results = Vec::new();
    let mut i = 0;
    while i < parts.len() {
        let mut intensity = "";
        let mut suffix = "";
        let mut bit = parts[i];

        if let Some(rest) = bit.strip_prefix('-') {
            intensity = "light ";
            bit = rest;
        } else if let Some(rest) = bit.strip_prefix('+') {
            intensity = "heavy ";
            bit = rest;
        } else if bit == "VC" {
            suffix = " in the vicinity";
            i += 1;
            match parts.get(i) {
                Some(next) => bit = next,
                None => break,
            }
        }

        // Descriptors and conditions may be glued together ("SHRA").
        let mut desc = "";
        if let Some(d) = bit.get(..2).and_then(descriptor) {
            desc = d;
            bit = &bit[2..];
            if bit.is_empty() {
                i += 1;
                match parts.get(i) {
                    Some(next) => bit = next,
                    None => {
                        results.push(format!("{}{}{}", intensity, desc.trim_end(), suffix));
                        break;
                    }
                }
            }
        }

        i += 1;
        if let Some(c) = condition(bit) {
            results.push(format!("{}{}{}{}", intensity, desc, c, suffix));
        }
    }

    if results.is_empty() {
        "clear".to_string()
    } else {
        results.join(", ")
    }
}

/// A parsed METAR column value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetarValue {
    /// Decimal integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// `true`/`false` flag.
    Bool(bool),
    /// Anything else.
    Text(String),
}

impl MetarValue {
    fn parse(s: &str) -> Self {
        if let Ok(i) = s.parse::<i64>() {
            return MetarValue::Int(i);
        }
        // "NaN" and "inf" stay text so repeated readings compare equal.
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return MetarValue::Float(f);
            }
        }
        match s {
            "true" | "TRUE" | "True" | "t" | "T" => MetarValue::Bool(true),
            "false" | "FALSE" | "False" | "f" | "F" => MetarValue::Bool(false),
            _ => MetarValue::Text(s.to_string()),
        }
    }

    /// The numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetarValue::Int(i) => Some(*i as f64),
            MetarValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// One parsed observation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetarObservation {
    /// Remaining columns keyed by name.
    pub fields: HashMap<String, MetarValue>,
    /// Readable sky cover ("clear", "broken at 3500", ...).
    pub sky_cover: String,
    /// Readable present weather ("light rain, mist", "clear", ...).
    pub wx_condition: String,
}

impl MetarObservation {
    /// # Parse CSV
    ///
    /// Parses the full CSV response body.
    ///
    /// # Errors
    /// Fails when the response is too short, the result count is missing or
    /// zero.
    pub fn parse_csv(text: &str) -> Result<Self, FeedError> {
        let lines: Vec<&str> = text.trim().lines().collect();
        if lines.len() < 6 {
            return Err(FeedError::InvalidData(format!(
                "too few lines (expected >= 6; got {})",
                lines.len()
            )));
        }

        let nresults: i64 = lines[4]
            .split_whitespace()
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FeedError::InvalidData(format!("cannot parse result count from {:?}", lines[4])))?;
        if nresults < 1 {
            return Err(FeedError::InvalidData("no results".to_string()));
        }

        let names: Vec<&str> = lines[5].trim().split(',').collect();
        let values: Vec<&str> = lines[lines.len() - 1].trim().split(',').collect();

        let mut observation = MetarObservation::default();
        let mut low_clouds = Vec::new();
        let mut high_clouds = Vec::new();

        for (i, name) in names.iter().enumerate() {
            let Some(value) = values.get(i) else {
                break;
            };
            match *name {
                "wx_string" => observation.wx_condition = weather_condition(value),
                "sky_cover" => {
                    if names.get(i + 1) != Some(&"cloud_base_ft_agl") {
                        continue;
                    }
                    let base = values.get(i + 1).and_then(|b| b.parse::<i64>().ok());
                    match (*value, base) {
                        ("FEW", Some(base)) => low_clouds.push(format!("few at {}", base)),
                        ("SCT", Some(base)) => low_clouds.push(format!("scattered at {}", base)),
                        ("BKN", Some(base)) => high_clouds.push(format!("broken at {}", base)),
                        ("OVC", Some(base)) => high_clouds.push(format!("overcast deck at {}", base)),
                        ("OVX", Some(_)) => high_clouds.push("overcast".to_string()),
                        _ => {}
                    }
                }
                // Consumed by the preceding sky_cover column.
                "cloud_base_ft_agl" => {}
                _ => {
                    observation.fields.insert(name.to_string(), MetarValue::parse(value));
                }
            }
        }

        observation.sky_cover = if !high_clouds.is_empty() {
            high_clouds.join(", ")
        } else if !low_clouds.is_empty() {
            low_clouds.join(", ")
        } else {
            "clear".to_string()
        };
        Ok(observation)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(MetarValue::as_f64)
    }

    /// Wind speed in MPH, `0` when unreported.
    pub fn wind_speed_mph(&self) -> f64 {
        self.number("wind_speed_kt").map(mph_from_knots).unwrap_or(0.0)
    }

    /// Gust speed in MPH, `0` when unreported.
    pub fn wind_gust_speed_mph(&self) -> f64 {
        self.number("wind_gust_kt").map(mph_from_knots).unwrap_or(0.0)
    }

    /// Wind direction in degrees magnetic.
    pub fn wind_direction_degrees(&self, declination: i64) -> i64 {
        let true_dir = self.number("wind_dir_degrees").unwrap_or(0.0) as i64;
        (true_dir + declination).rem_euclid(360)
    }

    /// Readable wind conditions.
    pub fn wind_conditions(&self, declination: i64) -> String {
        let speed = self.wind_speed_mph();
        if speed <= 0.0 {
            return "light and variable".to_string();
        }
        let direction = self.wind_direction_degrees(declination);
        let cardinal = cardinal_direction(direction as f64);
        let gusting = self.wind_gust_speed_mph();
        if gusting > 0.0 {
            format!(
                "{} MPH gusting to {} MPH from {}° ({})",
                speed as i64, gusting as i64, direction, cardinal
            )
        } else {
            format!("{} MPH from {}° ({})", speed as i64, direction, cardinal)
        }
    }

    /// "C℃ / F℉", or `"data error"` when no temperature was reported.
    pub fn temperature_string(&self) -> String {
        match self.number("temp_c") {
            Some(t) => format!("{}℃ / {}℉", t as i64, fahrenheit_from_celsius(t) as i64),
            None => "data error".to_string(),
        }
    }

    /// Station coordinates, when reported.
    pub fn location(&self) -> Option<(f64, f64)> {
        Some((self.number("latitude")?, self.number("longitude")?))
    }
}

/// # METAR Controller
///
/// Fetches observations for the configured station and keeps the latest one.
pub struct MetarController {
    settings: Arc<Settings>,
    client: ApiClient,
    state: Mutex<MetarObservation>,
}

impl MetarController {
    /// Creates a controller for the configured station.
    pub fn new(settings: Arc<Settings>) -> Result<Self, FeedError> {
        let client = ApiClient::new(
            &settings.config().metar.url,
            ClientOptions {
                user_agent: Some(settings.config().user_agent.clone()),
                timeout: settings.request_timeout(),
                ..Default::default()
            },
        )?;
        Ok(Self {
            settings,
            client,
            state: Mutex::new(MetarObservation::default()),
        })
    }

    /// Fetches and parses the latest observation.
    ///
    /// # Returns
    /// `Ok(true)` when any field, the sky cover or the weather changed.
    pub async fn refresh(&self) -> Result<bool, FeedError> {
        let metar = &self.settings.config().metar;
        let url = format!("{}&stationString={}", metar.url, metar.station);
        let response = self.client.request_text(Method::GET, &url, None, None).await?;
        let text = into_body(response)?;
        self.apply_text(&text)
    }

    /// Parses a CSV body and stores it.
    pub fn apply_text(&self, text: &str) -> Result<bool, FeedError> {
        let observation = MetarObservation::parse_csv(text)?;
        let mut state = self.lock();
        if *state == observation {
            return Ok(false);
        }
        *state = observation;
        Ok(true)
    }

    /// A copy of the latest observation.
    pub fn observation(&self) -> MetarObservation {
        self.lock().clone()
    }

    /// Readable wind conditions using the configured declination.
    pub fn wind_conditions(&self) -> String {
        self.lock().wind_conditions(self.settings.config().metar.magnetic_declination)
    }

    /// Readable sky cover, `"data error"` before the first observation.
    pub fn sky_cover(&self) -> String {
        or_data_error(&self.lock().sky_cover)
    }

    /// Readable present weather, `"data error"` before the first observation.
    pub fn weather_conditions(&self) -> String {
        or_data_error(&self.lock().wx_condition)
    }

    /// Readable temperature.
    pub fn temperature_string(&self) -> String {
        self.lock().temperature_string()
    }

    /// Station coordinates, when known.
    pub fn location(&self) -> Option<(f64, f64)> {
        self.lock().location()
    }

    fn lock(&self) -> MutexGuard<'_, MetarObservation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn or_data_error(s: &str) -> String {
    if s.is_empty() {
        "data error".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "No errors\nNo warnings\n4 ms\ndata source=metars\n1 results\n\
raw_text,station_id,latitude,longitude,temp_c,wind_dir_degrees,wind_speed_kt,wind_gust_kt,wx_string,sky_cover,cloud_base_ft_agl,sky_cover,cloud_base_ft_agl\n\
KORE 121756Z,KORE,42.57,-72.29,21.1,270,10,18,-RA BR,SCT,3500,BKN,5000\n";

    #[test]
    fn sample_observation_derives_display_strings() {
        let obs = MetarObservation::parse_csv(SAMPLE).unwrap();
        assert_eq!(obs.sky_cover, "broken at 5000");
        assert_eq!(obs.wx_condition, "light rain, mist");
        assert_eq!(obs.temperature_string(), "21℃ / 69℉");
        assert_eq!(obs.location(), Some((42.57, -72.29)));
        assert_eq!(obs.wind_conditions(-14), "11 MPH gusting to 20 MPH from 256° (WSW)");
    }

    #[test]
    fn calm_wind_is_light_and_variable() {
        let text = "a\nb\nc\nd\n1 results\nwind_speed_kt,wind_dir_degrees\n0,0\n";
        let obs = MetarObservation::parse_csv(text).unwrap();
        assert_eq!(obs.wind_conditions(-14), "light and variable");
        assert_eq!(obs.sky_cover, "clear");
    }

    #[test]
    fn short_or_empty_responses_fail() {
        assert!(MetarObservation::parse_csv("No errors\nNo warnings\n").is_err());
        let none = "a\nb\nc\nd\n0 results\nstation_id\nKORE\n";
        assert!(MetarObservation::parse_csv(none).is_err());
    }

    #[test]
    fn non_finite_readings_are_stable() {
        let text = "a\nb\nc\nd\n1 results\nstation_id,temp_c\nKORE,NaN\n";
        let first = MetarObservation::parse_csv(text).unwrap();
        let second = MetarObservation::parse_csv(text).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fields["temp_c"], MetarValue::Text("NaN".to_string()));
        assert_eq!(first.temperature_string(), "data error");
    }

    #[test]
    fn weather_codes_decode() {
        assert_eq!(weather_condition(""), "clear");
        assert_eq!(weather_condition("+SHSN"), "heavy showers snow");
        assert_eq!(weather_condition("VC TS"), "thunderstorm in the vicinity");
        assert_eq!(weather_condition("FZ FG"), "freezing fog");
        assert_eq!(weather_condition("XX HZ"), "haze");
    }

    #[test]
    fn cardinal_points_wrap() {
        assert_eq!(cardinal_direction(0.0), "N");
        assert_eq!(cardinal_direction(359.0), "N");
        assert_eq!(cardinal_direction(-90.0), "W");
        assert_eq!(cardinal_direction(135.0), "SE");
    }
}
