//! Request and response types for the QRNG service.
//!
//! Field names on the wire are camelCase; the enumerations serialize as their
//! lowercase names (`hex`, `uint32`, `dilithium3`, ...).

use crate::error::{Error, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Smallest number of bytes a single request may ask for.
pub const MIN_BYTES: usize = 1;

/// Largest number of bytes a single request (or stream chunk) may ask for.
pub const MAX_BYTES: usize = 1024;

/// Default number of bytes per request.
pub const DEFAULT_BYTES: usize = 32;

/// Encoding of the returned entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lowercase hexadecimal string.
    #[default]
    Hex,
    /// Standard base64 string.
    Base64,
    /// String of `0`/`1` characters, most significant bit first.
    Binary,
    /// Array of integers in `0..=255`.
    Uint8,
    /// Array of integers in `0..=u32::MAX`.
    Uint32,
}

impl OutputFormat {
    /// Every accepted format.
    pub const ALL: [Self; 5] = [Self::Hex, Self::Base64, Self::Binary, Self::Uint8, Self::Uint32];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base64 => "base64",
            Self::Binary => "binary",
            Self::Uint8 => "uint8",
            Self::Uint32 => "uint32",
        }
    }

    /// Whether the service returns this format as an integer array.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint32)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown format '{s}' (expected one of hex, base64, binary, uint8, uint32)"
                ))
            })
    }
}

/// Physical source the service should draw entropy from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantumMethod {
    /// Let the service pick.
    Auto,
    /// Photon arrival / beam splitter.
    Photon,
    /// Quantum tunneling noise.
    Tunneling,
    /// Vacuum fluctuation measurement.
    Vacuum,
    /// Software simulator.
    Simulator,
}

impl QuantumMethod {
    /// Every accepted method.
    pub const ALL: [Self; 5] = [
        Self::Auto,
        Self::Photon,
        Self::Tunneling,
        Self::Vacuum,
        Self::Simulator,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Photon => "photon",
            Self::Tunneling => "tunneling",
            Self::Vacuum => "vacuum",
            Self::Simulator => "simulator",
        }
    }
}

impl fmt::Display for QuantumMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantumMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown method '{s}' (expected one of auto, photon, tunneling, vacuum, simulator)"
                ))
            })
    }
}

/// Signature scheme used to attest the returned entropy.
///
/// Dilithium variants require a Pro tier or higher on the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
    /// Classical Ed25519.
    Ed25519,
    /// ML-DSA-44.
    Dilithium2,
    /// ML-DSA-65.
    Dilithium3,
    /// ML-DSA-87.
    Dilithium5,
}

impl SignatureType {
    /// Every accepted signature type.
    pub const ALL: [Self; 4] = [
        Self::Ed25519,
        Self::Dilithium2,
        Self::Dilithium3,
        Self::Dilithium5,
    ];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Dilithium2 => "dilithium2",
            Self::Dilithium3 => "dilithium3",
            Self::Dilithium5 => "dilithium5",
        }
    }

    /// Whether this is a post-quantum scheme.
    #[must_use]
    pub const fn is_post_quantum(self) -> bool {
        !matches!(self, Self::Ed25519)
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|sig| sig.as_str() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown signature type '{s}' (expected one of ed25519, dilithium2, dilithium3, dilithium5)"
                ))
            })
    }
}

/// Check a byte count against the per-request limits.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `count` is outside `1..=1024`.
pub fn validate_byte_count(count: usize) -> Result<()> {
    if (MIN_BYTES..=MAX_BYTES).contains(&count) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "byte count must be between {MIN_BYTES} and {MAX_BYTES}, got {count}"
        )))
    }
}

/// Parameters for a single entropy generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Number of random bytes, `1..=1024`.
    pub byte_count: usize,
    /// Output encoding.
    pub format: OutputFormat,
    /// Entropy source; the service default when `None`.
    pub method: Option<QuantumMethod>,
    /// Attestation scheme; the service default when `None`.
    pub signature_type: Option<SignatureType>,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self::new(DEFAULT_BYTES, OutputFormat::default())
    }
}

impl GenerateRequest {
    /// Create a request for `byte_count` bytes in `format`.
    #[must_use]
    pub const fn new(byte_count: usize, format: OutputFormat) -> Self {
        Self {
            byte_count,
            format,
            method: None,
            signature_type: None,
        }
    }

    /// Request a specific entropy source.
    #[must_use]
    pub const fn with_method(mut self, method: QuantumMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Request a specific signature scheme.
    #[must_use]
    pub const fn with_signature_type(mut self, signature_type: SignatureType) -> Self {
        self.signature_type = Some(signature_type);
        self
    }

    /// Build a request from untyped strings, as received from a CLI or form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an out-of-range count or an unknown
    /// format, method or signature type.
    pub fn parse(
        byte_count: usize,
        format: &str,
        method: Option<&str>,
        signature_type: Option<&str>,
    ) -> Result<Self> {
        let request = Self {
            byte_count,
            format: format.parse()?,
            method: method.map(str::parse).transpose()?,
            signature_type: signature_type.map(str::parse).transpose()?,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check local constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the byte count is out of range.
    pub fn validate(&self) -> Result<()> {
        validate_byte_count(self.byte_count)
    }

    /// Query string parameters understood by `/api/random`.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("bytes", self.byte_count.to_string()),
            ("format", self.format.as_str().to_string()),
        ];
        if let Some(method) = self.method {
            pairs.push(("method", method.as_str().to_string()));
        }
        if let Some(signature_type) = self.signature_type {
            pairs.push(("signatureType", signature_type.as_str().to_string()));
        }
        pairs
    }
}

/// A formatted entropy payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntropyData {
    /// `hex`, `base64` and `binary` payloads.
    Text(String),
    /// `uint8` and `uint32` payloads.
    Integers(Vec<u64>),
    /// Raw bytes from a binary stream frame.
    #[serde(skip_deserializing)]
    Raw(Vec<u8>),
}

impl EntropyData {
    /// The payload as text, if it is textual.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The payload as integers, if it is numeric.
    #[must_use]
    pub fn as_integers(&self) -> Option<&[u64]> {
        match self {
            Self::Integers(values) => Some(values),
            _ => None,
        }
    }

    /// Whether the payload shape is what `format` produces.
    #[must_use]
    pub fn matches_format(&self, format: OutputFormat) -> bool {
        match self {
            Self::Text(_) => !format.is_numeric(),
            Self::Integers(_) => format.is_numeric(),
            Self::Raw(_) => true,
        }
    }

    /// Decode the payload into raw bytes.
    ///
    /// `uint32` values are emitted big-endian.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the payload is not valid for `format`.
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        match (self, format) {
            (Self::Raw(bytes), _) => Ok(bytes.clone()),
            (Self::Text(text), OutputFormat::Hex) => {
                hex::decode(text).map_err(|e| Error::Decode(format!("invalid hex payload: {e}")))
            }
            (Self::Text(text), OutputFormat::Base64) => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| Error::Decode(format!("invalid base64 payload: {e}"))),
            (Self::Text(text), OutputFormat::Binary) => decode_bit_string(text),
            (Self::Integers(values), OutputFormat::Uint8) => values
                .iter()
                .map(|&v| {
                    u8::try_from(v).map_err(|_| Error::Decode(format!("uint8 value out of range: {v}")))
                })
                .collect(),
            (Self::Integers(values), OutputFormat::Uint32) => {
                let mut out = Vec::with_capacity(values.len() * 4);
                for &v in values {
                    let word = u32::try_from(v)
                        .map_err(|_| Error::Decode(format!("uint32 value out of range: {v}")))?;
                    out.extend_from_slice(&word.to_be_bytes());
                }
                Ok(out)
            }
            (_, format) => Err(Error::Decode(format!(
                "payload shape does not match format '{format}'"
            ))),
        }
    }
}

fn decode_bit_string(text: &str) -> Result<Vec<u8>> {
    if text.len() % 8 != 0 {
        return Err(Error::Decode(format!(
            "binary payload length {} is not a multiple of 8",
            text.len()
        )));
    }
    text.as_bytes()
        .chunks(8)
        .map(|bits| {
            bits.iter().try_fold(0u8, |acc, bit| match bit {
                b'0' => Ok(acc << 1),
                b'1' => Ok((acc << 1) | 1),
                other => Err(Error::Decode(format!(
                    "invalid binary digit '{}'",
                    char::from(*other)
                ))),
            })
        })
        .collect()
}

/// Entropy returned by `/api/random`, with its attestation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntropyResult {
    /// The formatted payload.
    pub data: EntropyData,
    /// Identifier correlating this result with its attestation.
    pub proof_id: String,
    /// Signature over the payload.
    pub signature: String,
    /// Public key that produced the signature.
    pub public_key: String,
    /// Scheme used for the signature.
    pub signature_type: String,
    /// Service-defined extra fields.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Snapshot of the service's health, including NIST test results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status string reported by the service.
    pub status: String,
    /// NIST statistical test results keyed by test name.
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Time the snapshot was taken, as reported by the service.
    #[serde(default)]
    pub timestamp: String,
}

impl HealthStatus {
    /// Whether the service reports itself healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }

    /// The snapshot time, if it is a valid RFC 3339 timestamp.
    #[must_use]
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// One unit of streamed entropy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position of this chunk in the session, starting at zero.
    pub sequence: u64,
    /// Format negotiated for the session.
    pub format: OutputFormat,
    /// The payload.
    pub data: EntropyData,
}

impl Chunk {
    /// Decode the chunk into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the payload is not valid for the format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.data.to_bytes(self.format)
    }
}
