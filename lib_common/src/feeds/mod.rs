//! # Upstream Feed Normalizers
//!
//! Each feed turns one external data source into a canonical, comparable
//! model and keeps the latest value behind its own mutex.
//!
//! ## Contained Modules:
//!
//! - **`burble`**: the public Burble manifest (loads, jumpers, groups).
//! - **`metar`**: surface weather observations from a METAR CSV endpoint.
//! - **`winds`**: the winds aloft forecast, one sample per 1000 ft.
//!
//! Every controller follows the same contract: `refresh()` fetches and parses
//! one snapshot and returns `Ok(true)` only when the stored value changed.
//! A failed refresh leaves the previous value untouched.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

/// Burble manifest normalizer.
pub mod burble;
/// METAR surface weather normalizer.
pub mod metar;
/// Winds aloft normalizer.
pub mod winds;

/// Errors raised while fetching or parsing a feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// The upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error body, possibly empty.
        body: String,
    },

    /// The payload is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload parsed but does not have the expected shape.
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

impl From<anyhow::Error> for FeedError {
    /// Sorts client errors by cause: JSON and body decoding failures are data
    /// errors, everything else is treated as a network failure.
    fn from(e: anyhow::Error) -> Self {
        let e = match e.downcast::<serde_json::Error>() {
            Ok(json) => return FeedError::Json(json),
            Err(e) => e,
        };
        match e.downcast_ref::<reqwest::Error>() {
            Some(re) if re.is_decode() => FeedError::InvalidData(re.to_string()),
            _ => FeedError::Network(e.to_string()),
        }
    }
}

/// Unwraps the body of a successful response, mapping anything else to [`FeedError::Status`].
pub(crate) fn into_body<T>(response: crate::retrieve::ky_http::ApiResponse<T>) -> Result<T, FeedError> {
    match response.data {
        Some(data) if response.success => Ok(data),
        _ => Err(FeedError::Status {
            status: response.status,
            body: response.error_body.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_cause() {
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(FeedError::from(anyhow::Error::new(json)), FeedError::Json(_)));

        let network = anyhow::anyhow!("connection refused");
        match FeedError::from(network) {
            FeedError::Network(message) => assert_eq!(message, "connection refused"),
            other => panic!("expected a network error, got {:?}", other),
        }
    }

    #[test]
    fn failed_responses_become_status_errors() {
        let response = crate::retrieve::ky_http::ApiResponse::<serde_json::Value> {
            data: None,
            error_body: Some("busy".to_string()),
            status: 503,
            success: false,
            headers: Default::default(),
        };
        match into_body(response) {
            Err(FeedError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("expected a status error, got {:?}", other),
        }
    }
}
