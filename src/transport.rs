//! HTTP transport used by the request client.
//!
//! [`QrngClient`](crate::QrngClient) talks to the network only through
//! [`HttpTransport`], so tests can substitute a scripted transport and assert
//! exactly which calls were attempted.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use std::future::Future;
use tracing::debug;

/// Header carrying the API key (`X-API-Key`).
pub const API_KEY_HEADER: &str = "x-api-key";

/// A single outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Endpoint URL, without query string.
    pub url: Url,
    /// Query string parameters.
    pub query: Vec<(&'static str, String)>,
}

/// A raw response as received from the service.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is declared as JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim_start().starts_with("application/json"))
    }
}

/// Transport capable of issuing authenticated GET requests.
///
/// Implementations perform exactly one attempt per call; retry policy belongs
/// to the caller.
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request.
    fn get(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send;

    /// Release pooled connections. Further calls fail with a transport error.
    fn close(&self);
}

/// Production transport backed by a pooled [`reqwest::Client`].
pub struct ReqwestTransport {
    client: Mutex<Option<reqwest::Client>>,
}

impl ReqwestTransport {
    /// Build a transport that sends the configured API key and honors the
    /// configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// TLS backend cannot be initialised.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut key = HeaderValue::from_str(config.api_key())
            .map_err(|e| Error::Config(format!("API key is not a valid header value: {e}")))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_KEY_HEADER), key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .user_agent(concat!("qrng-client-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }

    /// Whether [`HttpTransport::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client.lock().is_none()
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send {
        let client = self.client.lock().clone();
        async move {
            let client = client.ok_or_else(|| Error::Transport("client is closed".to_string()))?;

            debug!("GET {}", request.url);
            let response = client.get(request.url).query(&request.query).send().await?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let body = response.bytes().await?;

            debug!("Response {} ({} bytes)", status, body.len());
            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        }
    }

    fn close(&self) {
        if self.client.lock().take().is_some() {
            debug!("HTTP transport closed");
        }
    }
}
