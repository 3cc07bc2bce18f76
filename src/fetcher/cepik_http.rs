//! HTTP transports for the CEPiK API
//!
//! The upstream server still negotiates Diffie-Hellman suites with keys
//! smaller than current OpenSSL defaults accept. [`TlsPolicy::Legacy`], the
//! default, therefore goes through [`OpenSslTransport`], whose connector runs
//! at OpenSSL security level 1. [`TlsPolicy::Strict`] uses reqwest with its
//! stock native-tls settings.

use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::fetcher::cepik_config::CONNECT_TIMEOUT;
pub use crate::fetcher::legacy_tls::OpenSslTransport;
use crate::fetcher::{FetcherError, FetcherResult, HttpResponse, HttpTransport};

/// TLS configuration for the upstream connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsPolicy {
    /// OpenSSL at `DEFAULT@SECLEVEL=1`, accepting 1024-bit DH parameters
    #[default]
    Legacy,
    /// reqwest defaults
    Strict,
}

/// Transport implementing `policy`
///
/// # Errors
/// Returns `Tls` if the TLS connector cannot be built and `Transport` if the
/// HTTP client rejects its configuration.
pub fn transport_for(policy: TlsPolicy) -> FetcherResult<Arc<dyn HttpTransport>> {
    Ok(match policy {
        TlsPolicy::Legacy => Arc::new(OpenSslTransport::legacy()?),
        TlsPolicy::Strict => Arc::new(ReqwestTransport::new()?),
    })
}

/// [`HttpTransport`] over a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with reqwest's native-tls defaults
    ///
    /// # Errors
    /// Returns `Transport` if reqwest rejects the client configuration.
    pub fn new() -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .use_native_tls()
            .build()
            .map_err(|e| FetcherError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> FetcherResult<HttpResponse> {
        debug!(url, params = params.len(), "GET");

        let response = self
            .client
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| classify_error(&e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Classify a reqwest failure into the fetcher error taxonomy
fn classify_error(err: &reqwest::Error) -> FetcherError {
    if is_tls_failure(err) {
        return FetcherError::Tls(err.to_string());
    }
    if err.is_timeout() {
        return FetcherError::Timeout(err.to_string());
    }
    FetcherError::Transport(err.to_string())
}

/// Walk the source chain looking for a TLS failure
///
/// Typed TLS errors decide it. Message text is only consulted below the
/// reqwest layer, whose own message embeds the request URL.
pub(crate) fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<native_tls::Error>()
            || e.is::<openssl::ssl::Error>()
            || e.is::<openssl::error::ErrorStack>()
        {
            return true;
        }
        if !e.is::<reqwest::Error>() && looks_like_tls_message(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}

fn looks_like_tls_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["certificate verify", "handshake", "ssl routines", "tls alert"]
        .iter()
        .any(|needle| lower.contains(needle))
}
