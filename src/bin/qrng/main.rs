//! qrng CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use qrng_client::{Callbacks, Chunk, GenerateRequest, OutputFormat, QrngClient, QrngStreamClient};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; stdout carries the JSON output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("qrng v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.client_config()?;

    match cli.command {
        Command::Generate {
            bytes,
            format,
            method,
            signature_type,
        } => {
            let request = GenerateRequest {
                byte_count: bytes,
                format,
                method,
                signature_type,
            };
            let client = QrngClient::new(config)?;
            let result = client.generate(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Health => {
            let client = QrngClient::new(config)?;
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Stream {
            chunk_size,
            format,
            count,
        } => stream(QrngStreamClient::new(config)?, chunk_size, format, count).await?,
    }

    Ok(())
}

enum StreamEvent {
    Data(Chunk),
    Failed(qrng_client::Error),
    Closed,
}

async fn stream(
    client: QrngStreamClient,
    chunk_size: usize,
    format: OutputFormat,
    count: Option<u64>,
) -> color_eyre::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let data_tx = tx.clone();
    let error_tx = tx.clone();

    let callbacks = Callbacks::new(move |chunk| {
        let _ = data_tx.send(StreamEvent::Data(chunk));
    })
    .with_error(move |e| {
        let _ = error_tx.send(StreamEvent::Failed(e));
    })
    .with_close(move || {
        let _ = tx.send(StreamEvent::Closed);
    });

    let session = client.connect(callbacks, chunk_size, format).await?;
    let mut received = 0u64;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(StreamEvent::Data(chunk)) => {
                    println!("{}", serde_json::to_string(&chunk)?);
                    received += 1;
                    if count.is_some_and(|limit| received >= limit) {
                        break;
                    }
                }
                Some(StreamEvent::Failed(e)) => {
                    session.disconnect().await?;
                    return Err(e.into());
                }
                Some(StreamEvent::Closed) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
        }
    }

    session.disconnect().await?;
    info!("Received {} chunks", received);
    Ok(())
}
