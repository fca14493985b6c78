//! # qrng-client
//!
//! Client for the QRNG API, quantum random number generation as a service.
//!
//! The crate provides:
//! - [`QrngClient`]: single-shot REST calls (`generate`, `health`)
//! - [`QrngStreamClient`]: a WebSocket stream of entropy chunks delivered to
//!   a [`StreamHandler`]
//! - A typed [`Error`] distinguishing validation, authentication, rate limit,
//!   quota, transport and other service failures
//!
//! Entropy generation, signing and quota enforcement all happen server-side.
//! The client never retries; back-off policy belongs to the caller.
//!
//! ## Example
//!
//! ```rust,no_run
//! use qrng_client::{ClientConfig, GenerateRequest, OutputFormat, QrngClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = QrngClient::new(ClientConfig::new("qnrk_..."))?;
//!     let result = client
//!         .generate(&GenerateRequest::new(32, OutputFormat::Hex))
//!         .await?;
//!     println!("{:?} (proof {})", result.data, result.proof_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use qrng_client::{Callbacks, ClientConfig, OutputFormat, QrngStreamClient};
//!
//! # async fn demo() -> qrng_client::Result<()> {
//! let client = QrngStreamClient::new(ClientConfig::new("qnrk_..."))?;
//! let session = client
//!     .connect(Callbacks::new(|chunk| println!("{:?}", chunk.data)), 32, OutputFormat::Hex)
//!     .await?;
//! // ...
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod error;
pub mod stream;
pub mod transport;
pub mod types;

pub use client::QrngClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use stream::{Callbacks, QrngStreamClient, StreamHandler, StreamSession};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    Chunk, EntropyData, EntropyResult, GenerateRequest, HealthStatus, OutputFormat, QuantumMethod,
    SignatureType,
};
