//! Request client for single-shot calls against the QRNG REST API.
//!
//! ## Calls
//!
//! - `generate`: `GET /api/random` with the request encoded as query parameters
//! - `health`: `GET /api/health`
//!
//! Every call makes exactly one attempt. Non-2xx responses are mapped onto
//! the typed [`Error`] variants; network failures surface as
//! [`Error::Transport`].
//!
//! ## Resource Lifetime
//!
//! The client owns its transport. Calling [`QrngClient::close`] or simply
//! dropping the client releases pooled connections exactly once, including
//! when a call returned an error.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::types::{EntropyResult, GenerateRequest, HealthStatus};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Path of the entropy endpoint.
pub const RANDOM_PATH: &str = "/api/random";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/api/health";

/// Client for the QRNG REST API.
///
/// Cheap to share by reference: concurrent calls only read the immutable
/// configuration.
///
/// ```rust,no_run
/// use qrng_client::{ClientConfig, GenerateRequest, OutputFormat, QrngClient};
///
/// # async fn demo() -> qrng_client::Result<()> {
/// let client = QrngClient::new(ClientConfig::new("qnrk_..."))?;
/// let result = client.generate(&GenerateRequest::new(32, OutputFormat::Hex)).await?;
/// println!("{:?}", result.data);
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct QrngClient<T: HttpTransport = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
}

impl QrngClient<ReqwestTransport> {
    /// Create a client using the production HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: HttpTransport> QrngClient<T> {
    /// Create a client over an explicit transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        debug!("Creating QRNG client for {}", config.base_url());
        Self {
            config,
            transport,
        }
    }

    /// The client's configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Generate random entropy.
    ///
    /// The request is validated before any network access.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for an out-of-range byte count
    /// - [`Error::Authentication`] for an invalid API key
    /// - [`Error::RateLimit`] when throttled
    /// - [`Error::QuotaExceeded`] when the usage quota is exhausted
    /// - [`Error::Service`] for any other non-2xx response
    /// - [`Error::Transport`] for network failures
    pub async fn generate(&self, request: &GenerateRequest) -> Result<EntropyResult> {
        request.validate()?;

        let http = HttpRequest {
            url: self.config.endpoint(RANDOM_PATH)?,
            query: request.query_pairs(),
        };

        debug!(
            "Requesting {} bytes as {} from {}",
            request.byte_count, request.format, self.config.base_url()
        );
        let response = self.transport.get(http).await?;
        let result: EntropyResult = decode_response(&response)?;

        if !result.data.matches_format(request.format) {
            warn!(
                "Payload for proof {} does not look like {}",
                result.proof_id, request.format
            );
        }
        debug!("Received entropy with proof {}", result.proof_id);
        Ok(result)
    }

    /// Fetch the service health snapshot, including NIST test results.
    ///
    /// # Errors
    ///
    /// Same mapping as [`QrngClient::generate`].
    pub async fn health(&self) -> Result<HealthStatus> {
        let http = HttpRequest {
            url: self.config.endpoint(HEALTH_PATH)?,
            query: Vec::new(),
        };
        let response = self.transport.get(http).await?;
        let health: HealthStatus = decode_response(&response)?;

        debug!("Service status: {}", health.status);
        Ok(health)
    }

    /// Release the underlying connections.
    pub fn close(self) {
        // Drop does the work.
    }
}

impl<T: HttpTransport> Drop for QrngClient<T> {
    fn drop(&mut self) {
        self.transport.close();
        info!("QRNG client closed");
    }
}

fn decode_response<R: DeserializeOwned>(response: &HttpResponse) -> Result<R> {
    if !response.is_success() {
        return Err(map_error_response(response));
    }
    serde_json::from_slice(&response.body).map_err(|e| {
        Error::Decode(format!(
            "unexpected response body (HTTP {}): {e}",
            response.status
        ))
    })
}

/// Map a non-2xx response onto the error taxonomy.
#[must_use]
pub fn map_error_response(response: &HttpResponse) -> Error {
    let body: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
    let reported = body
        .get("error")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let message = |fallback: &str| reported.clone().unwrap_or_else(|| fallback.to_string());

    let error = match response.status {
        401 => Error::Authentication(message("Invalid API key")),
        402 => Error::QuotaExceeded(message("Monthly quota exceeded")),
        429 | 403 if has_quota_marker(&body) => {
            Error::QuotaExceeded(message("Monthly quota exceeded"))
        }
        429 => Error::RateLimit(message("Rate limit exceeded")),
        status => Error::Service {
            status,
            message: message(&format!("HTTP {status}")),
            body,
        },
    };
    warn!("Request failed: {}", error);
    error
}

/// Whether a JSON error body identifies quota exhaustion rather than throttling.
pub(crate) fn has_quota_marker(body: &Value) -> bool {
    let code_marks = body
        .get("code")
        .and_then(Value::as_str)
        .is_some_and(|code| code.eq_ignore_ascii_case("QUOTA_EXCEEDED"));
    let error_marks = body
        .get("error")
        .and_then(Value::as_str)
        .is_some_and(|msg| msg.to_ascii_lowercase().contains("quota"));
    code_marks || error_marks
}
