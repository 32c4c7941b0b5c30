//! HTTP transport for the session cache.
//!
//! The cache only ever talks to a [`Transport`], so tests can substitute a
//! scripted one. [`HttpTransport`] keeps a cookie jar: the session cookie is
//! `HttpOnly` and never surfaces in this API.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::errors::ClientError;
use crate::APP_USER_AGENT;

/// Default request timeout applied by [`HttpTransport`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A request relative to the auth route prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    /// `ClientError::Serialization` if `body` cannot be encoded.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|err| ClientError::Serialization(format!("Failed to encode request: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Status and decoded body of a completed request.
///
/// Empty bodies decode to `Value::Null`; bodies that are not JSON are kept as
/// `Value::String`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Any HTTP status is a successful send; only failures
    /// to get a response at all are errors.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}

/// `reqwest` transport with a cookie jar, bound to one server and prefix.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// # Errors
    /// `ClientError::Config` for an invalid server URL, `ClientError::Network`
    /// if the HTTP client cannot be built.
    pub fn new(server_url: &str, prefix: &str) -> Result<Self, ClientError> {
        Self::with_timeout(server_url, prefix, DEFAULT_TIMEOUT)
    }

    /// # Errors
    /// `ClientError::Config` for an invalid server URL, `ClientError::Network`
    /// if the HTTP client cannot be built.
    pub fn with_timeout(
        server_url: &str,
        prefix: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let server = Url::parse(server_url.trim())
            .map_err(|err| ClientError::Config(format!("Invalid server URL {server_url}: {err}")))?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "Server URL must use http or https: {server_url}"
            )));
        }

        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: build_url(server_url, prefix),
        })
    }

    fn url(&self, path: &str) -> String {
        build_url(&self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = self.url(&request.path);
        debug!("{} {url}", request.method);

        let mut builder = self.client.request(request.method, &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_request_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_request_error)?;

        Ok(ApiResponse {
            status,
            body: decode_body(text),
        })
    }
}

fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }
}

/// Joins a base URL and a path with exactly one slash between them.
fn build_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim().trim_start_matches('/');

    if path.is_empty() {
        base.to_string()
    } else if base.is_empty() {
        format!("/{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn map_request_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout("Request timed out. Please try again.".to_string())
    } else {
        ClientError::Network(format!("Unable to reach the server: {err}"))
    }
}
