//! Configuration for qrng-client.

use crate::error::{Error, Result};
use crate::types::OutputFormat;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Production service origin.
pub const DEFAULT_BASE_URL: &str = "https://qrngapi.com";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "QRNG_API_KEY";

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "QRNG_BASE_URL";

/// Environment variable overriding the timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "QRNG_TIMEOUT_SECS";

/// Client configuration shared by the request and stream clients.
///
/// Fields are private; once handed to a client the configuration is never
/// mutated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Opaque API credential.
    api_key: String,

    /// Service origin, without a trailing slash.
    #[serde(default = "default_base_url", deserialize_with = "deserialize_base_url")]
    base_url: String,

    /// Request and handshake timeout.
    #[serde(
        rename = "timeout_secs",
        default = "default_timeout",
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    timeout: Duration,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

fn deserialize_base_url<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim_end_matches('/').to_string())
}

fn serialize_secs<S: Serializer>(timeout: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(timeout.as_secs())
}

fn deserialize_secs<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for the production service.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }

    /// Replace the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Point the client at a different service origin.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The service origin.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build a configuration from `QRNG_API_KEY`, `QRNG_BASE_URL` and
    /// `QRNG_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the timeout is not a number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::Config(format!("{ENV_API_KEY} is not set")))?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config = config.with_base_url(base_url);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {ENV_TIMEOUT_SECS}: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location of the per-user configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "qrngapi", "qrng")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".qrng/config.toml"))
    }

    /// Check the configuration before any connection is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is empty, the URL is not an
    /// http(s)/ws(s) URL, or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        self.parse_base()?;
        Ok(())
    }

    fn parse_base(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL '{}': {e}", self.base_url)))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => Ok(url),
            other => Err(Error::Config(format!("unsupported URL scheme '{other}'"))),
        }
    }

    /// HTTP(S) URL of a REST endpoint such as `/api/random`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.parse_base()?;
        let scheme = match url.scheme() {
            "ws" => Some("http"),
            "wss" => Some("https"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::Config(format!("cannot use scheme {scheme}")))?;
        }
        join_path(&mut url, path);
        Ok(url)
    }

    /// WebSocket URL of the streaming endpoint with its negotiation query.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn stream_url(&self, chunk_size: usize, format: OutputFormat) -> Result<Url> {
        let mut url = self.parse_base()?;
        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            _ => None,
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|()| Error::Config(format!("cannot use scheme {scheme}")))?;
        }
        join_path(&mut url, "/api/stream");
        url.query_pairs_mut()
            .append_pair("chunkSize", &chunk_size.to_string())
            .append_pair("format", format.as_str());
        Ok(url)
    }
}

/// Append `path` to any path prefix already present in the base URL.
fn join_path(url: &mut Url, path: &str) {
    let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
    url.set_path(&joined);
}
