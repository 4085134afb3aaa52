//! Request dispatch for HTTP steps.
//!
//! The executor talks to the network only through [`Dispatcher`], so tests can script
//! responses and transport failures without a live server.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, Method};
use serde_json::Value;
use spindle_types::HttpMethod;
use thiserror::Error;
use tracing::debug;

use super::parse_response_body;
use crate::{redact_headers, redact_sensitive};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
    pub verify_tls: bool,
}

/// Status, headers, and decoded body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResponse {
    pub code: u16,
    pub headers: IndexMap<String, String>,
    pub body: Value,
}

impl DispatchResponse {
    pub fn new(code: u16, body: Value) -> Self {
        Self {
            code,
            headers: IndexMap::new(),
            body,
        }
    }
}

/// Transport-level failures. An HTTP error status is a response, not a `DispatchError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header '{0}'")]
    InvalidHeader(String),

    #[error("could not build the HTTP client: {0}")]
    Client(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(error: reqwest::Error) -> Self {
        let message = redact_sensitive(&error.to_string());
        if error.is_timeout() {
            DispatchError::Timeout(message)
        } else if error.is_connect() {
            DispatchError::Connect(message)
        } else if error.is_builder() {
            DispatchError::Client(message)
        } else {
            DispatchError::Transport(message)
        }
    }
}

/// Issues one HTTP request.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResponse, DispatchError>;
}

/// [`Dispatcher`] backed by `reqwest`, with one client per TLS policy.
#[derive(Debug, Clone)]
pub struct ReqwestDispatcher {
    verifying: Client,
    insecure: Client,
}

impl ReqwestDispatcher {
    pub fn new() -> Result<Self, DispatchError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, DispatchError> {
        let build = |verify_tls: bool| {
            Client::builder()
                .brotli(true)
                .connect_timeout(connect_timeout)
                .timeout(request_timeout)
                .danger_accept_invalid_certs(!verify_tls)
                .build()
                .map_err(|error| DispatchError::Client(error.to_string()))
        };
        Ok(Self {
            verifying: build(true)?,
            insecure: build(false)?,
        })
    }

    fn client(&self, verify_tls: bool) -> &Client {
        if verify_tls { &self.verifying } else { &self.insecure }
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Connect => Method::CONNECT,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Trace => Method::TRACE,
    }
}

#[async_trait]
impl Dispatcher for ReqwestDispatcher {
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResponse, DispatchError> {
        let start = Instant::now();
        let method = to_reqwest_method(request.method);
        debug!(
            method = %method,
            url = %redact_sensitive(&request.url),
            headers = ?redact_headers(&request.headers),
            has_body = request.body.is_some(),
            "http request started"
        );

        let mut builder = self.client(request.verify_tls).request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            if name.trim().is_empty() {
                return Err(DispatchError::InvalidHeader(name.clone()));
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body).map_err(|error| DispatchError::Transport(error.to_string()))?);
        }

        let response = builder.send().await?;
        let code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let text = response.text().await?;

        debug!(
            method = %method,
            url = %redact_sensitive(&request.url),
            status = code,
            body_len = text.len(),
            duration_ms = start.elapsed().as_millis(),
            "http request completed"
        );
        Ok(DispatchResponse {
            code,
            headers,
            body: parse_response_body(&text),
        })
    }
}
