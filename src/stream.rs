//! WebSocket streaming client.
//!
//! A [`StreamSession`] owns one background receive loop. The loop decodes
//! each inbound frame and hands it to the session's [`StreamHandler`] in the
//! order the service sent it.
//!
//! ## Session Lifecycle
//!
//! 1. `connect` performs the upgrade (bounded by the configured timeout) and
//!    sends the negotiation frame `{apiKey, chunkSize, format}`
//! 2. The receive loop delivers chunks to `on_data`
//! 3. The session ends when the caller disconnects, the service closes the
//!    socket, or the connection fails
//!
//! A connection failure or a service error frame calls `on_error` once and
//! then `on_close`. A clean end calls `on_close` only. There is no automatic
//! reconnect.
//!
//! `disconnect` waits for the loop to finish, so once it returns no callback
//! is running and none will run again.

use crate::client::{has_quota_marker, map_error_response};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{HttpResponse, API_KEY_HEADER};
use crate::types::{validate_byte_count, Chunk, EntropyData, OutputFormat};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::CONTENT_TYPE, HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

/// How long to wait for the close frame to flush on disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receiver of stream events.
///
/// Callbacks run on the session's receive loop, one at a time. They must not
/// block indefinitely, since `disconnect` waits for the running callback.
pub trait StreamHandler: Send + 'static {
    /// A chunk arrived.
    fn on_data(&mut self, chunk: Chunk);

    /// The connection failed or the service reported an error.
    fn on_error(&mut self, error: Error) {
        warn!("Unhandled stream error: {}", error);
    }

    /// The session ended.
    fn on_close(&mut self) {}
}

type DataFn = Box<dyn FnMut(Chunk) + Send>;
type ErrorFn = Box<dyn FnMut(Error) + Send>;
type CloseFn = Box<dyn FnMut() + Send>;

/// [`StreamHandler`] assembled from closures.
///
/// ```rust
/// use qrng_client::Callbacks;
///
/// let callbacks = Callbacks::new(|chunk| println!("{:?}", chunk.data))
///     .with_error(|e| eprintln!("stream failed: {e}"))
///     .with_close(|| println!("closed"));
/// # drop(callbacks);
/// ```
pub struct Callbacks {
    on_data: DataFn,
    on_error: Option<ErrorFn>,
    on_close: Option<CloseFn>,
}

impl Callbacks {
    /// Callbacks with only a data handler.
    #[must_use]
    pub fn new(on_data: impl FnMut(Chunk) + Send + 'static) -> Self {
        Self {
            on_data: Box::new(on_data),
            on_error: None,
            on_close: None,
        }
    }

    /// Add an error handler.
    #[must_use]
    pub fn with_error(mut self, on_error: impl FnMut(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Add a close handler.
    #[must_use]
    pub fn with_close(mut self, on_close: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }
}

impl StreamHandler for Callbacks {
    fn on_data(&mut self, chunk: Chunk) {
        (self.on_data)(chunk);
    }

    fn on_error(&mut self, error: Error) {
        match self.on_error.as_mut() {
            Some(on_error) => on_error(error),
            None => warn!("Unhandled stream error: {}", error),
        }
    }

    fn on_close(&mut self) {
        if let Some(on_close) = self.on_close.as_mut() {
            on_close();
        }
    }
}

/// Client that opens streaming sessions.
#[derive(Debug, Clone)]
pub struct QrngStreamClient {
    config: ClientConfig,
}

impl QrngStreamClient {
    /// Create a streaming client.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The client's configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open a stream delivering `chunk_size`-byte chunks in `format`.
    ///
    /// Returns once the upgrade has completed and the negotiation frame has
    /// been sent; chunks then arrive on `handler` in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `chunk_size` is outside `1..=1024`
    /// - [`Error::Authentication`], [`Error::RateLimit`] or
    ///   [`Error::QuotaExceeded`] if the service refuses the upgrade
    /// - [`Error::Transport`] if the connection fails or times out
    pub async fn connect<H: StreamHandler>(
        &self,
        handler: H,
        chunk_size: usize,
        format: OutputFormat,
    ) -> Result<StreamSession> {
        validate_byte_count(chunk_size)?;

        let url = self.config.stream_url(chunk_size, format)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Config(format!("invalid stream URL: {e}")))?;
        let key = HeaderValue::from_str(self.config.api_key())
            .map_err(|e| Error::Config(format!("API key is not a valid header value: {e}")))?;
        request
            .headers_mut()
            .insert(HeaderName::from_static(API_KEY_HEADER), key);

        debug!("Connecting to {}", url);
        let timeout = self.config.timeout();
        let (socket, _) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| Error::Transport(format!("stream handshake timed out after {timeout:?}")))?
            .map_err(map_handshake_error)?;

        let (mut sink, frames) = socket.split();

        let negotiation = serde_json::json!({
            "apiKey": self.config.api_key(),
            "chunkSize": chunk_size,
            "format": format,
        });
        tokio::time::timeout(timeout, sink.send(Message::text(negotiation.to_string())))
            .await
            .map_err(|_| Error::Transport("stream negotiation timed out".to_string()))?
            .map_err(|e| Error::Transport(format!("failed to send negotiation frame: {e}")))?;

        info!("Stream connected ({} byte chunks, {})", chunk_size, format);
        Ok(StreamSession::spawn(frames, sink, handler, chunk_size, format))
    }
}

/// Map a failed upgrade the same way as a failed REST call.
fn map_handshake_error(error: tungstenite::Error) -> Error {
    match error {
        tungstenite::Error::Http(response) => {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let status = response.status().as_u16();
            let body = response.into_body().map(Bytes::from).unwrap_or_default();
            map_error_response(&HttpResponse {
                status,
                content_type,
                body,
            })
        }
        other => Error::Transport(format!("stream connection failed: {other}")),
    }
}

/// State shared between a session handle and its receive loop.
#[derive(Debug)]
struct SessionState {
    /// Cleared when the caller disconnects or the loop ends.
    live: AtomicBool,
    /// Set when the handle is dropped without `disconnect`.
    detached: AtomicBool,
    delivered: AtomicU64,
}

#[derive(Debug)]
struct SessionTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// A live streaming session.
///
/// Dropping the session stops the receive loop without invoking any further
/// callbacks, `on_close` included. Use [`StreamSession::disconnect`] for an
/// orderly shutdown.
#[derive(Debug)]
pub struct StreamSession {
    state: Arc<SessionState>,
    task: Mutex<Option<SessionTask>>,
    /// Flips to `true` once the receive loop has run its last callback.
    finished: watch::Receiver<bool>,
    chunk_size: usize,
    format: OutputFormat,
}

impl StreamSession {
    /// Start a receive loop over an already-negotiated frame stream.
    pub(crate) fn spawn<St, Si, H>(
        frames: St,
        sink: Si,
        handler: H,
        chunk_size: usize,
        format: OutputFormat,
    ) -> Self
    where
        St: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin + Send + 'static,
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: Display,
        H: StreamHandler,
    {
        let state = Arc::new(SessionState {
            live: AtomicBool::new(true),
            detached: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(false);
        let handle = tokio::spawn(receive_loop(
            frames,
            sink,
            handler,
            format,
            Arc::clone(&state),
            shutdown_rx,
            finished_tx,
        ));

        Self {
            state,
            task: Mutex::new(Some(SessionTask {
                shutdown: shutdown_tx,
                handle,
            })),
            finished: finished_rx,
            chunk_size,
            format,
        }
    }

    /// Whether the receive loop is still delivering chunks.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::Acquire)
    }

    /// Number of chunks delivered to `on_data` so far.
    #[must_use]
    pub fn chunks_delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Acquire)
    }

    /// Negotiated chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Negotiated output format.
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Close the socket and wait for the receive loop to stop.
    ///
    /// `on_close` runs before this returns unless the session had already
    /// ended. Concurrent and repeated calls all wait for the same loop to
    /// stop; only the first one sends the close frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stream`] if the receive loop panicked.
    pub async fn disconnect(&self) -> Result<()> {
        let task = self.task.lock().take();
        let Some(task) = task else {
            // A dropped sender also means the loop is gone.
            let mut finished = self.finished.clone();
            let _ = finished.wait_for(|done| *done).await;
            return Ok(());
        };

        debug!("Disconnecting stream");
        self.state.live.store(false, Ordering::Release);
        // The loop may already have exited on its own.
        let _ = task.shutdown.send(());

        task.handle
            .await
            .map_err(|e| Error::Stream(format!("receive loop failed: {e}")))?;
        info!(
            "Stream disconnected after {} chunks",
            self.chunks_delivered()
        );
        Ok(())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            self.state.detached.store(true, Ordering::Release);
            self.state.live.store(false, Ordering::Release);
            let _ = task.shutdown.send(());
        }
    }
}

/// How the receive loop ended.
enum Outcome {
    Disconnected,
    Closed,
    Failed(Error),
}

/// Decoded inbound frame.
enum Inbound {
    Data(EntropyData),
    Ignored,
    Closed,
}

async fn receive_loop<St, Si, H>(
    mut frames: St,
    mut sink: Si,
    mut handler: H,
    format: OutputFormat,
    state: Arc<SessionState>,
    mut shutdown: oneshot::Receiver<()>,
    finished: watch::Sender<bool>,
) where
    St: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin + Send,
    Si: Sink<Message> + Unpin + Send,
    Si::Error: Display,
    H: StreamHandler,
{
    let mut sequence = 0u64;

    let outcome = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break Outcome::Disconnected,

            frame = frames.next() => match frame {
                Some(Ok(message)) => match decode_frame(message, format) {
                    Ok(Inbound::Data(data)) => {
                        if !state.live.load(Ordering::Acquire) {
                            break Outcome::Disconnected;
                        }
                        state.delivered.fetch_add(1, Ordering::AcqRel);
                        handler.on_data(Chunk { sequence, format, data });
                        sequence += 1;
                    }
                    Ok(Inbound::Ignored) => {}
                    Ok(Inbound::Closed) => break Outcome::Closed,
                    Err(e) => break Outcome::Failed(e),
                },
                Some(Err(e)) => break Outcome::Failed(Error::Stream(e.to_string())),
                None => break Outcome::Closed,
            },
        }
    };

    if matches!(outcome, Outcome::Disconnected) {
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Close frame not sent: {}", e),
            Err(_) => debug!("Close frame timed out"),
        }
    }

    let was_live = state.live.swap(false, Ordering::AcqRel);
    let detached = state.detached.load(Ordering::Acquire);

    match outcome {
        Outcome::Failed(error) => {
            warn!("Stream failed: {}", error);
            if was_live && !detached {
                handler.on_error(error);
            }
        }
        Outcome::Closed => debug!("Stream closed by service"),
        Outcome::Disconnected => {}
    }

    if !detached {
        handler.on_close();
    }
    finished.send_replace(true);
}

fn decode_frame(message: Message, format: OutputFormat) -> Result<Inbound> {
    match message {
        Message::Text(text) => {
            let body: Value = serde_json::from_str(&text)
                .map_err(|e| Error::Decode(format!("malformed stream frame: {e}")))?;
            if body.get("error").is_some() {
                return Err(frame_error(&body));
            }
            match body.get("data") {
                Some(data) => {
                    let data: EntropyData = serde_json::from_value(data.clone())
                        .map_err(|e| Error::Decode(format!("malformed chunk payload: {e}")))?;
                    if !data.matches_format(format) {
                        return Err(Error::Decode(format!(
                            "chunk payload does not match format '{format}'"
                        )));
                    }
                    Ok(Inbound::Data(data))
                }
                None => {
                    debug!("Ignoring control frame: {}", body);
                    Ok(Inbound::Ignored)
                }
            }
        }
        Message::Binary(bytes) => Ok(Inbound::Data(EntropyData::Raw(bytes.to_vec()))),
        Message::Close(_) => Ok(Inbound::Closed),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Ignored),
    }
}

/// Map a service-sent `{"error": ...}` frame onto the error taxonomy.
fn frame_error(body: &Value) -> Error {
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("stream error")
        .to_string();
    let code = body
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();

    if has_quota_marker(body) {
        Error::QuotaExceeded(message)
    } else if code == "UNAUTHORIZED" || code == "INVALID_API_KEY" {
        Error::Authentication(message)
    } else if code == "RATE_LIMITED" {
        Error::RateLimit(message)
    } else {
        Error::Stream(message)
    }
}
