//! Error types for qrng-client.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the QRNG service.
#[derive(Error, Debug)]
pub enum Error {
    /// Request parameters failed local validation. Nothing was sent.
    #[error("validation error: {0}")]
    Validation(String),

    /// The service rejected the API key.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Short-term throttling reported by the service.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Usage quota for the billing period is exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Network-level failure (timeout, DNS, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other non-2xx response from the service.
    #[error("service error (HTTP {status}): {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Message reported by the service, or `HTTP <status>`.
        message: String,
        /// Parsed JSON body, `Null` when the body was not JSON.
        body: serde_json::Value,
    },

    /// A response or frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Streaming connection failure or a service-reported stream error.
    #[error("stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Whether a caller may reasonably retry the same call after backing off.
    ///
    /// The client itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit(_) | Self::Transport(_))
    }

    /// HTTP status code implied by the error kind.
    ///
    /// `Service` carries the status that was received. `Authentication` and
    /// `RateLimit` report their canonical 401 and 429 even when they came
    /// from a stream error frame. `QuotaExceeded` has no single status, since
    /// the service signals it with 402, 403 or 429, so it returns `None`.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication(_) => Some(401),
            Self::RateLimit(_) => Some(429),
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
