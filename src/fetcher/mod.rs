//! HTTP transport, response parsing and pagination for the CEPiK API

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub mod cepik_config;
pub mod cepik_http;
pub mod cepik_parser;
pub mod dictionary;
pub mod legacy_tls;
pub mod pagination;

/// Fetcher errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetcherError {
    /// Request rejected before anything was sent
    #[error("validation error: {0}")]
    Validation(String),

    /// Connection failure or 5xx response
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded its timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// TLS handshake or certificate failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-throttle HTTP error status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Response did not have the expected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// Throttle retries exhausted for a single page
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded {
        /// Number of throttled attempts
        attempts: u32,
    },

    /// Pagination did not terminate within the page cap
    #[error("page limit of {0} reached before the last page")]
    PageLimit(u32),
}

impl FetcherError {
    /// Whether the single transport retry applies to this error
    ///
    /// Timeouts, connection failures and 5xx responses are retried.
    /// TLS failures, client errors and parse failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// A fully read HTTP response
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers, lowercased names
    pub headers: HashMap<String, String>,
    /// Raw body text
    pub body: String,
}

impl HttpResponse {
    /// Create a response with no headers
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header (name is lowercased)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json(&self) -> FetcherResult<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| FetcherError::Parse(format!("invalid JSON body: {e}")))
    }
}

/// HTTP GET seam used by the fetcher and dictionary cache
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; `Err` is reserved for requests that produced no response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request with query parameters and a per-request timeout
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> FetcherResult<HttpResponse>;
}

/// Map a non-success status to an error, leaving throttle detection to the caller.
pub fn status_error(response: &HttpResponse) -> FetcherError {
    let message: String = response.body.chars().take(200).collect();
    if response.status >= 500 {
        FetcherError::Transport(format!("server error {}: {}", response.status, message))
    } else {
        FetcherError::Http {
            status: response.status,
            message,
        }
    }
}
