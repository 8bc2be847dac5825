//! Duplex WebSocket client with background reader and writer tasks.

use crate::flow::{decode_frame, Flow};
use crate::{ComError, Command};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Stored in the latency cell until the first write completes.
const NO_LATENCY: u64 = u64::MAX;

/// How long [`Client::close`] waits for the server to acknowledge the close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Whichever of the two inbound queues produced something first.
#[derive(Debug)]
pub enum Event<M> {
    Message(M),
    Error(ComError),
}

/// A connection to one server, decoding inbound frames through `F`.
pub struct Client<F: Flow> {
    commands: mpsc::UnboundedSender<Box<dyn Command>>,
    messages: mpsc::UnboundedReceiver<F::Message>,
    errors: mpsc::UnboundedReceiver<ComError>,
    latency: Arc<AtomicU64>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl<F: Flow> Client<F> {
    /// Connect to `url` (`ws://` or `wss://`).
    pub async fn connect(url: &str, flow: F) -> Result<Self, ComError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(ComError::Connect)?;
        info!("Connected to {}", url);
        Ok(Self::from_stream(stream, flow))
    }

    /// Wrap an already-upgraded WebSocket stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: WebSocketStream<S>, flow: F) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, source) = stream.split();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let latency = Arc::new(AtomicU64::new(NO_LATENCY));

        let writer = tokio::spawn(write_loop(sink, cmd_rx, err_tx.clone(), latency.clone()));
        let reader = tokio::spawn(read_loop(source, flow, msg_tx, err_tx));

        Self {
            commands: cmd_tx,
            messages: msg_rx,
            errors: err_rx,
            latency,
            reader,
            writer,
        }
    }

    /// Queue a command for the writer.
    pub fn send(&self, command: impl Command) -> Result<(), ComError> {
        self.commands
            .send(Box::new(command))
            .map_err(|_| ComError::Closed)
    }

    /// Next decoded message, or `None` once the connection is gone and the
    /// queue is drained.
    pub async fn next_message(&mut self) -> Option<F::Message> {
        self.messages.recv().await
    }

    /// Next reported error. The last error of a connection is always
    /// [`ComError::Closed`].
    pub async fn next_error(&mut self) -> Option<ComError> {
        self.errors.recv().await
    }

    /// Wait on both queues, preferring messages when both are ready.
    pub async fn next_event(&mut self) -> Option<Event<F::Message>> {
        tokio::select! {
            biased;
            Some(msg) = self.messages.recv() => Some(Event::Message(msg)),
            Some(err) = self.errors.recv() => Some(Event::Error(err)),
            else => None,
        }
    }

    /// Duration of the most recent successful write.
    pub fn latency(&self) -> Option<Duration> {
        match self.latency.load(Ordering::Relaxed) {
            NO_LATENCY => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    /// Close the socket and wait for both loops to end.
    pub async fn close(self) {
        let Client {
            commands,
            mut reader,
            writer,
            ..
        } = self;

        // Dropping the last sender makes the writer send a close frame.
        drop(commands);
        let _ = writer.await;
        if tokio::time::timeout(CLOSE_GRACE, &mut reader).await.is_err() {
            debug!("Server did not acknowledge close, dropping connection");
            reader.abort();
        }
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut commands: mpsc::UnboundedReceiver<Box<dyn Command>>,
    errors: mpsc::UnboundedSender<ComError>,
    latency: Arc<AtomicU64>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping command: {}", e);
                let _ = errors.send(e);
                continue;
            }
        };

        debug!("-> {}", frame);
        let start = Instant::now();
        match sink.send(Message::Text(frame.into())).await {
            Ok(()) => {
                let elapsed = start.elapsed().as_micros().min(u128::from(NO_LATENCY - 1));
                latency.store(elapsed as u64, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Write failed: {}", e);
                let _ = errors.send(ComError::Transport(e));
            }
        }
    }

    let _ = sink.close().await;
}

async fn read_loop<S, F>(
    mut source: SplitStream<WebSocketStream<S>>,
    flow: F,
    messages: mpsc::UnboundedSender<F::Message>,
    errors: mpsc::UnboundedSender<ComError>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Flow,
{
    while let Some(frame) = source.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!("Ignoring non UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Read failed: {}", e);
                // The stream cannot recover from these.
                let fatal = matches!(
                    e,
                    tungstenite::Error::ConnectionClosed
                        | tungstenite::Error::AlreadyClosed
                        | tungstenite::Error::Io(_)
                );
                let _ = errors.send(ComError::Transport(e));
                if fatal {
                    break;
                }
                continue;
            }
        };

        debug!("<- {}", text);
        match decode_frame(&flow, &text) {
            Ok(msg) => {
                if messages.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to decode frame: {}", e);
                let _ = errors.send(e);
            }
        }
    }

    info!("Connection closed");
    let _ = errors.send(ComError::Closed);
}
