//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries, a per-client
//! cookie jar for feeds that need a browser-like session, a per-request timeout,
//! and standardized JSON/text response handling.

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// A standardized container for API responses.
///
/// This struct wraps the decoded data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully decoded response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A request body accepted by [`ApiClient::request`].
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as `application/json`.
    Json(serde_json::Value),
    /// Sent verbatim as `application/x-www-form-urlencoded; charset=UTF-8`.
    Form(String),
}

/// Construction options for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// User agent presented on every request.
    pub user_agent: Option<String>,
    /// Timeout applied to each individual attempt.
    pub timeout: Duration,
    /// Transient-error retries before giving up.
    pub max_retries: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// session cookies, and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// Cookies set by any response, replayed on later requests.
    cookies: Arc<Jar>,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy and its own cookie jar.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL (e.g., "https://dzm.burblesoft.com/").
    /// * `options` - User agent, timeout and retry count.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not absolute or the TLS backend fails to
    /// initialize.
    pub fn new(base_url: &str, options: ClientOptions) -> anyhow::Result<Self> {
        // Parse the base URL to ensure it is valid and absolute
        let url = Url::parse(base_url)?;
        let cookies = Arc::new(Jar::default());

        let mut builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(options.timeout);
        if let Some(agent) = &options.user_agent {
            builder = builder.user_agent(agent.as_str());
        }

        // Configure an exponential backoff policy
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);

        // Construct the client with the retry middleware
        let client = ClientBuilder::new(builder.build()?)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            cookies,
        })
    }

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Returns `true` when the jar holds at least one cookie that would be sent to `path`.
    pub fn has_cookies_for(&self, path: &str) -> anyhow::Result<bool> {
        let url = self.url(path)?;
        Ok(self.cookies.cookies(&url).is_some())
    }

    /// Performs a request and decodes a successful body as JSON.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb (GET, POST, etc.).
    /// * `path` - The relative path (with query) to append to the base URL.
    /// * `headers` - Optional additional headers for this specific request.
    /// * `body` - Optional JSON or form body.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining, network execution or JSON decoding fails.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, headers, body).await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            Ok(Self::failure(response, resp_headers).await)
        }
    }

    /// Performs a request and returns a successful body as text.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining or network execution fails.
    pub async fn request_text(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> anyhow::Result<ApiResponse<String>> {
        let response = self.send(method, path, headers, body).await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let text = response.text().await?;
            Ok(ApiResponse {
                data: Some(text),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            Ok(Self::failure(response, resp_headers).await)
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<RequestBody>,
    ) -> anyhow::Result<reqwest::Response> {
        // 1. Construct the full absolute URL
        let full_url = self.url(path)?;
        let mut req = self.inner.request(method, full_url);

        // 2. Add Custom Headers if provided
        if let Some(h) = headers {
            req = req.headers(h);
        }

        // 3. Attach the body with its content type
        match body {
            Some(RequestBody::Json(value)) => {
                let json_body = serde_json::to_string(&value)?;
                req = req
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(json_body);
            }
            Some(RequestBody::Form(encoded)) => {
                req = req
                    .header(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
                    )
                    .body(encoded);
            }
            None => {}
        }

        // 4. Execute; retries happen inside the middleware
        let response: reqwest::Response = req.send().await?;
        Ok(response)
    }

    async fn failure<T>(response: reqwest::Response, headers: HeaderMap) -> ApiResponse<T> {
        let status = response.status().as_u16();
        // Capture the error body as a string for debugging
        let error_text = response.text().await.ok();
        ApiResponse {
            data: None,
            error_body: error_text,
            status,
            success: false,
            headers,
        }
    }
}
