use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Header map with lowercased names, shared by requests and responses.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound API call. Immutable once enqueued; a retry re-enqueues the
/// same request at the front of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Search-API calls get their own quota window and minimum spacing.
    pub fn is_search(&self) -> bool {
        self.url.contains("/search/")
    }

    /// Short human-readable label used in status output and errors.
    pub fn operation(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Raw upstream reply. Produced for every HTTP status; classification into
/// success, quota, and failure happens in the dispatcher worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Errors surfaced to dispatcher callers.
///
/// Quota exhaustion (429 and disguised-429) is handled internally by retry
/// and never appears here unless a configured retry ceiling is hit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("request queue is full ({capacity} requests), try again later")]
    QueueFull { capacity: usize },
    #[error("request timed out after {seconds}s: {operation} (queue depth: {queue_depth})")]
    Timeout {
        operation: String,
        queue_depth: usize,
        seconds: u64,
    },
    #[error("forbidden: {operation}: {message}")]
    Forbidden { operation: String, message: String },
    #[error("http status {status}: {operation}")]
    HttpStatus { status: u16, operation: String },
    #[error("transport error: {operation}: {message}")]
    Transport { operation: String, message: String },
    #[error("retry limit reached after {attempts} attempts: {operation}")]
    RetriesExhausted { attempts: u32, operation: String },
}
