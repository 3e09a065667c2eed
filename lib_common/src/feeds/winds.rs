//! # Winds Aloft Forecast
//!
//! Reads the winds aloft forecast for the configured coordinates. The
//! upstream reports `direction`, `speed` and `temp` as maps keyed by
//! altitude in feet ("0", "1000", ...); they are flattened into one sample
//! per 1000 ft, index `n` holding altitude `n * 1000`.

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::configs::Settings;
use crate::feeds::{into_body, FeedError};
use crate::retrieve::ky_http::{ApiClient, ClientOptions};
use crate::utils::decode::int_value;

/// One altitude of the forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindsAloftSample {
    /// Feet above ground, a multiple of 1000.
    pub altitude: i64,
    /// Degrees true the wind blows from.
    pub heading: i64,
    /// Knots.
    pub speed: i64,
    /// Degrees Celsius.
    pub temperature: i64,
    /// No meaningful direction (speed is zero or less).
    pub light_and_variable: bool,
}

/// A parsed forecast.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindsAloft {
    /// Samples from the ground up.
    pub samples: Vec<WindsAloftSample>,
    /// When the forecast becomes valid.
    pub valid_time: Option<DateTime<Utc>>,
}

impl WindsAloft {
    /// # Parse
    ///
    /// Parses the upstream JSON. `now` anchors the `validtime` hour to a
    /// date: an hour earlier than the current one belongs to tomorrow.
    pub fn parse(raw: &Value, now: DateTime<Utc>) -> Result<Self, FeedError> {
        let data = raw
            .as_object()
            .ok_or_else(|| FeedError::InvalidData("winds aloft data is invalid".to_string()))?;

        let valid_hour = int_value("validtime", data.get("validtime")).clamp(0, 23) as u32;
        let mut valid_time = now
            .date_naive()
            .and_time(NaiveTime::from_hms_opt(valid_hour, 0, 0).unwrap_or_default())
            .and_utc();
        if valid_hour < now.hour() {
            valid_time += ChronoDuration::days(1);
        }

        let direction = table(data, "direction")?;
        let speed = table(data, "speed")?;
        let temp = table(data, "temp")?;

        let count = direction.len().min(speed.len()).min(temp.len());
        let samples = (0..count)
            .map(|i| {
                let key = (i * 1000).to_string();
                let speed = int_value(&key, speed.get(&key));
                WindsAloftSample {
                    altitude: (i * 1000) as i64,
                    heading: int_value(&key, direction.get(&key)),
                    speed,
                    temperature: int_value(&key, temp.get(&key)),
                    light_and_variable: speed <= 0,
                }
            })
            .collect();

        Ok(Self {
            samples,
            valid_time: Some(valid_time),
        })
    }
}

fn table<'a>(data: &'a Map<String, Value>, key: &str) -> Result<&'a Map<String, Value>, FeedError> {
    data.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| FeedError::InvalidData(format!("{} missing from winds aloft data", key)))
}

/// # Winds Aloft Controller
///
/// Fetches the forecast for the configured coordinates and keeps the latest one.
pub struct WindsController {
    client: ApiClient,
    path: String,
    state: Mutex<WindsAloft>,
}

impl WindsController {
    /// Creates a controller for the configured coordinates.
    pub fn new(settings: Arc<Settings>) -> Result<Self, FeedError> {
        let winds = &settings.config().winds;
        let path = format!("{}&lat={}&lon={}", winds.url, winds.latitude, winds.longitude);
        let client = ApiClient::new(
            &winds.url,
            ClientOptions {
                user_agent: Some(settings.config().user_agent.clone()),
                timeout: settings.request_timeout(),
                ..Default::default()
            },
        )?;
        Ok(Self {
            client,
            path,
            state: Mutex::new(WindsAloft::default()),
        })
    }

    /// Fetches and parses the forecast.
    ///
    /// # Returns
    /// `Ok(true)` when the samples or the valid time changed.
    pub async fn refresh(&self) -> Result<bool, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static("https://markschulze.net/winds/"));
        let response = self
            .client
            .request::<Value>(Method::GET, &self.path, Some(headers), None)
            .await?;
        let raw = into_body(response)?;
        self.apply_payload(&raw, Utc::now())
    }

    /// Parses a payload and stores it.
    pub fn apply_payload(&self, raw: &Value, now: DateTime<Utc>) -> Result<bool, FeedError> {
        let winds = WindsAloft::parse(raw, now)?;
        let mut state = self.lock();
        if *state == winds {
            return Ok(false);
        }
        *state = winds;
        Ok(true)
    }

    /// The latest samples.
    pub fn samples(&self) -> Vec<WindsAloftSample> {
        self.lock().samples.clone()
    }

    /// When the latest forecast becomes valid.
    pub fn valid_time(&self) -> Option<DateTime<Utc>> {
        self.lock().valid_time
    }

    fn lock(&self) -> MutexGuard<'_, WindsAloft> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn sample_count_is_the_shortest_table() {
        let raw = json!({
            "validtime": "15",
            "direction": { "0": 270, "1000": "280", "2000": 290 },
            "speed": { "0": 0, "1000": 12, "2000": 20 },
            "temp": { "0": 20, "1000": 18 }
        });
        let w = WindsAloft::parse(&raw, noon()).unwrap();
        assert_eq!(w.samples.len(), 2);
        assert!(w.samples[0].light_and_variable);
        assert_eq!(w.samples[1], WindsAloftSample { altitude: 1000, heading: 280, speed: 12, temperature: 18, light_and_variable: false });
        assert_eq!(w.valid_time, Some(Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap()));
    }

    #[test]
    fn earlier_valid_hour_rolls_to_tomorrow() {
        let raw = json!({ "validtime": 3, "direction": {}, "speed": {}, "temp": {} });
        let w = WindsAloft::parse(&raw, noon()).unwrap();
        assert_eq!(w.valid_time, Some(Utc.with_ymd_and_hms(2024, 6, 2, 3, 0, 0).unwrap()));
    }

    #[test]
    fn missing_tables_fail() {
        assert!(WindsAloft::parse(&json!({ "validtime": 3 }), noon()).is_err());
        assert!(WindsAloft::parse(&json!([1, 2]), noon()).is_err());
    }
}
