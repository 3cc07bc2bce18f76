//! OpenSSL-backed transport for servers that only offer weak DH parameters
//!
//! reqwest's native-tls connector exposes no way to lower OpenSSL's security
//! level, so this transport drives hyper directly over a `hyper-openssl`
//! connector built from an [`SslConnector`] with `DEFAULT@SECLEVEL=1`.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper_openssl::client::legacy::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use openssl::ssl::{SslConnector, SslMethod};
use openssl::x509::X509;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

use crate::fetcher::cepik_config::CONNECT_TIMEOUT;
use crate::fetcher::cepik_http::is_tls_failure;
use crate::fetcher::{FetcherError, FetcherResult, HttpResponse, HttpTransport};

/// OpenSSL cipher string used by [`OpenSslTransport::legacy`]
pub const LEGACY_CIPHERS: &str = "DEFAULT@SECLEVEL=1";

type HyperClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// [`HttpTransport`] over hyper with an OpenSSL connector
#[derive(Clone)]
pub struct OpenSslTransport {
    client: HyperClient,
}

impl std::fmt::Debug for OpenSslTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSslTransport")
            .field("ciphers", &LEGACY_CIPHERS)
            .finish()
    }
}

impl OpenSslTransport {
    /// Transport trusting the system roots
    ///
    /// # Errors
    /// Returns `Tls` if OpenSSL rejects the connector configuration.
    pub fn legacy() -> FetcherResult<Self> {
        Self::build(Vec::new())
    }

    /// Transport trusting the system roots plus every certificate in `pem`
    ///
    /// # Errors
    /// Returns `Tls` if `pem` holds no parseable certificate or OpenSSL
    /// rejects the connector configuration.
    pub fn legacy_with_roots(pem: &[u8]) -> FetcherResult<Self> {
        let roots = X509::stack_from_pem(pem).map_err(tls_setup_error)?;
        if roots.is_empty() {
            return Err(FetcherError::Tls("no certificates in PEM input".to_string()));
        }
        Self::build(roots)
    }

    fn build(extra_roots: Vec<X509>) -> FetcherResult<Self> {
        let mut ssl = SslConnector::builder(SslMethod::tls()).map_err(tls_setup_error)?;
        ssl.set_cipher_list(LEGACY_CIPHERS).map_err(tls_setup_error)?;
        for root in extra_roots {
            ssl.cert_store_mut().add_cert(root).map_err(tls_setup_error)?;
        }

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(CONNECT_TIMEOUT));

        let https = HttpsConnector::with_connector(http, ssl).map_err(tls_setup_error)?;
        let client = Client::builder(TokioExecutor::new()).build(https);
        Ok(Self { client })
    }

    async fn send(&self, url: Url) -> FetcherResult<HttpResponse> {
        let request = Request::get(url.as_str())
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetcherError::Validation(format!("invalid request: {e}")))?;

        let response = self
            .client
            .request(request)
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

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FetcherError::Transport(format!("failed to read body: {e}")))?
            .to_bytes();

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl HttpTransport for OpenSslTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> FetcherResult<HttpResponse> {
        debug!(url, params = params.len(), "GET");

        let mut target = Url::parse(url)
            .map_err(|e| FetcherError::Validation(format!("invalid URL {url}: {e}")))?;
        if !params.is_empty() {
            target
                .query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        tokio::time::timeout(timeout, self.send(target))
            .await
            .map_err(|_| FetcherError::Timeout(format!("no response within {timeout:?}")))?
    }
}

fn tls_setup_error(err: openssl::error::ErrorStack) -> FetcherError {
    FetcherError::Tls(format!("failed to build TLS connector: {err}"))
}

fn classify_error(err: &hyper_util::client::legacy::Error) -> FetcherError {
    if is_tls_failure(err) {
        FetcherError::Tls(error_chain(err))
    } else {
        FetcherError::Transport(error_chain(err))
    }
}

/// `outer: inner: ...`, since hyper's top-level messages are terse
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}
