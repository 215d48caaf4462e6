use std::time::Duration;

use thiserror::Error;

use crate::types::{ApiRequest, Headers, Method, RawResponse};

/// Transport-level failure: the call never produced an HTTP response.
/// Upstream error statuses are not errors here; they arrive as `RawResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerformError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http client setup failed: {0}")]
    Client(String),
}

/// Basic-auth identity attached to every outbound call.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

/// Connection and identity settings for the real HTTP performer.
#[derive(Debug, Clone)]
pub struct PerformerSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub default_headers: Headers,
    pub credentials: Option<Credentials>,
}

impl Default for PerformerSettings {
    fn default() -> Self {
        let mut default_headers = Headers::new();
        default_headers.insert("accept".to_string(), "application/json".to_string());
        default_headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            default_headers,
            credentials: None,
        }
    }
}

/// Seam between the dispatcher and the network, so workers can be driven
/// against scripted responses in tests.
pub trait HttpPerformer: Send + Sync {
    fn perform(&self, request: &ApiRequest) -> Result<RawResponse, PerformError>;
}

/// Blocking reqwest-backed performer used by dispatcher worker threads.
///
/// Merges settings-level default headers with per-request headers (the
/// request wins) and attaches credentials when configured.
pub struct ReqwestPerformer {
    client: reqwest::blocking::Client,
    settings: PerformerSettings,
}

impl ReqwestPerformer {
    pub fn new(settings: PerformerSettings) -> Result<Self, PerformError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| PerformError::Client(err.to_string()))?;
        Ok(Self { client, settings })
    }
}

impl HttpPerformer for ReqwestPerformer {
    fn perform(&self, request: &ApiRequest) -> Result<RawResponse, PerformError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|err| PerformError::InvalidUrl(err.to_string()))?;

        let mut builder = self.client.request(to_reqwest_method(request.method), url);
        for (name, value) in &self.settings.default_headers {
            if !request.headers.contains_key(name) {
                builder = builder.header(name, value);
            }
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(credentials) = &self.settings.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.token));
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let body = response.text().map_err(map_reqwest_error)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> PerformError {
    if err.is_timeout() {
        return PerformError::Timeout(err.to_string());
    }
    PerformError::Network(err.to_string())
}
