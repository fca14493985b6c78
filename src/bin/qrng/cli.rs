//! Command-line interface definition.

use clap::{Parser, Subcommand};
use qrng_client::config::ClientConfig;
use qrng_client::{OutputFormat, QuantumMethod, SignatureType};
use std::path::PathBuf;
use std::time::Duration;

/// Quantum random numbers from the QRNG API.
#[derive(Parser, Debug)]
#[command(name = "qrng")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// API key.
    #[arg(long, env = "QRNG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Service base URL.
    #[arg(long, env = "QRNG_BASE_URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "QRNG_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    pub log_level: String,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate entropy once.
    Generate {
        /// Number of bytes (1-1024).
        #[arg(long, short, default_value_t = 32)]
        bytes: usize,

        /// Output format.
        #[arg(long, short, default_value = "hex")]
        format: OutputFormat,

        /// Entropy source.
        #[arg(long)]
        method: Option<QuantumMethod>,

        /// Signature scheme.
        #[arg(long)]
        signature_type: Option<SignatureType>,
    },

    /// Show service health and NIST test results.
    Health,

    /// Stream chunks until interrupted.
    Stream {
        /// Chunk size in bytes (1-1024).
        #[arg(long, default_value_t = 32)]
        chunk_size: usize,

        /// Output format.
        #[arg(long, short, default_value = "hex")]
        format: OutputFormat,

        /// Stop after this many chunks.
        #[arg(long, short = 'n')]
        count: Option<u64>,
    },
}

impl Cli {
    /// Build the client configuration: file, then environment and flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded,
    /// or no API key is available.
    pub fn client_config(&self) -> color_eyre::Result<ClientConfig> {
        let path = self.config.clone().or_else(|| {
            let default = ClientConfig::default_path();
            default.exists().then_some(default)
        });

        let mut config = match (path, &self.api_key) {
            (Some(path), _) => ClientConfig::from_file(&path)?,
            (None, Some(key)) => ClientConfig::new(key.clone()),
            (None, None) => {
                return Err(color_eyre::eyre::eyre!(
                    "no API key: pass --api-key, set QRNG_API_KEY or create {}",
                    ClientConfig::default_path().display()
                ))
            }
        };

        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}
