//! # Burble Controller
//!
//! Fetches the public manifest from Burble DZM and keeps the latest parsed
//! loads. The manifest endpoint only answers inside a browser-like session,
//! so a throwaway request to the public page seeds the cookie jar whenever
//! it holds no cookie for the manifest URL.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::model::Load;
use super::parser::ManifestParser;
use crate::configs::Settings;
use crate::feeds::{into_body, FeedError};
use crate::retrieve::ky_http::{ApiClient, ClientOptions, RequestBody};

const PUBLIC_PATH: &str = "jmp";
const MANIFEST_PATH: &str = "ajax_dzm2_frontend_jumpermanifestpublic";

#[derive(Debug, Default)]
struct ManifestState {
    column_count: usize,
    loads: Vec<Load>,
}

/// # Burble Controller
///
/// Owns the HTTP session for the manifest feed and the latest loads.
pub struct BurbleController {
    settings: Arc<Settings>,
    client: ApiClient,
    origin: String,
    state: Mutex<ManifestState>,
}

impl BurbleController {
    /// Creates a controller with its own cookie-holding client.
    pub fn new(settings: Arc<Settings>) -> Result<Self, FeedError> {
        let origin = settings.config().burble.base_url.trim_end_matches('/').to_string();
        let client = ApiClient::new(
            &format!("{}/", origin),
            ClientOptions {
                user_agent: Some(settings.config().user_agent.clone()),
                timeout: settings.request_timeout(),
                ..Default::default()
            },
        )?;
        Ok(Self {
            settings,
            client,
            origin,
            state: Mutex::new(ManifestState::default()),
        })
    }

    /// Makes a throwaway request to the public manifest page so the jar
    /// picks up session cookies.
    pub async fn refresh_cookies(&self) -> Result<(), FeedError> {
        let path = format!("{}?dz_id={}", PUBLIC_PATH, self.settings.burble_dropzone_id());
        self.client
            .request_text(Method::POST, &path, None, Some(RequestBody::Form(String::new())))
            .await?;
        log::debug!("Burble session cookies refreshed");
        Ok(())
    }

    /// # Fetch
    ///
    /// Requests `columns` loads from the manifest endpoint and returns the raw JSON.
    pub async fn fetch(&self, columns: usize) -> Result<Value, FeedError> {
        if !self.client.has_cookies_for(MANIFEST_PATH)? {
            self.refresh_cookies().await?;
        }

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("aircraft", "0")
            .append_pair("columns", &columns.to_string())
            .append_pair("display_tandem", "1")
            .append_pair("display_student", "1")
            .append_pair("display_sport", "1")
            .append_pair("display_menu", "0")
            .append_pair("font_size", "0")
            .append_pair("action", "getLoads")
            .append_pair("dz_id", &self.settings.burble_dropzone_id().to_string())
            .append_pair("date_format", "m/d/Y")
            .append_pair("acl_application", "Burble DZM")
            .finish();

        let response = self
            .client
            .request::<Value>(Method::POST, MANIFEST_PATH, Some(self.headers()), Some(RequestBody::Form(body)))
            .await?;
        into_body(response)
    }

    /// # Refresh
    ///
    /// Fetches and parses one manifest snapshot.
    ///
    /// # Returns
    /// `Ok(true)` when the displayed loads or the column count changed.
    pub async fn refresh(&self) -> Result<bool, FeedError> {
        let parser = ManifestParser::from_settings(&self.settings);
        let raw = self.fetch(parser.requested_columns()).await?;
        self.apply(&parser, &raw)
    }

    /// Parses a raw payload with the current settings and stores the result.
    pub fn apply_payload(&self, raw: &Value) -> Result<bool, FeedError> {
        self.apply(&ManifestParser::from_settings(&self.settings), raw)
    }

    fn apply(&self, parser: &ManifestParser, raw: &Value) -> Result<bool, FeedError> {
        let loads = parser.parse(raw)?;
        Ok(self.store(parser.display_columns(), loads))
    }

    /// Replaces the stored loads, returning `true` if anything differs.
    pub fn store(&self, column_count: usize, loads: Vec<Load>) -> bool {
        let mut state = self.lock();
        let mut changed = false;
        if state.column_count != column_count {
            state.column_count = column_count;
            changed = true;
        }
        if state.loads != loads {
            state.loads = loads;
            changed = true;
        }
        changed
    }

    /// The latest displayed loads.
    pub fn loads(&self) -> Vec<Load> {
        self.lock().loads.clone()
    }

    /// The column count the loads were selected for.
    pub fn column_count(&self) -> usize {
        self.lock().column_count
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert("Origin", origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/{}", self.origin, PUBLIC_PATH)) {
            headers.insert("Referer", referer);
        }
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers
    }

    fn lock(&self) -> MutexGuard<'_, ManifestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::SettingsConfig;
    use serde_json::json;

    fn controller() -> BurbleController {
        let settings = Arc::new(Settings::new(SettingsConfig::default()).unwrap());
        BurbleController::new(settings).unwrap()
    }

    #[test]
    fn same_payload_twice_reports_no_change() {
        let c = controller();
        let raw = json!({ "loads": [ {
            "id": 3, "name": "Otter 7", "time_left": 20, "max_slots": 10,
            "groups": [[ { "name": "Alice", "id": 1, "type": "Sport Jumper", "jump": "Solo", "is_public": true } ]]
        } ] });
        assert!(c.apply_payload(&raw).unwrap());
        let first = c.loads();
        assert!(!c.apply_payload(&raw).unwrap());
        assert_eq!(first, c.loads());
        assert_eq!(c.column_count(), 5);
    }

    #[test]
    fn failed_parse_keeps_previous_loads() {
        let c = controller();
        let raw = json!({ "loads": [ { "name": "Otter 1", "time_left": 20, "groups": [] } ] });
        c.apply_payload(&raw).unwrap();
        assert!(c.apply_payload(&json!("garbage")).is_err());
        assert_eq!(c.loads().len(), 1);
    }

    #[test]
    fn ajax_headers_mimic_the_public_page() {
        let h = controller().headers();
        assert_eq!(h["Origin"], "https://dzm.burblesoft.com");
        assert_eq!(h["Referer"], "https://dzm.burblesoft.com/jmp");
        assert_eq!(h["X-Requested-With"], "XMLHttpRequest");
    }
}
