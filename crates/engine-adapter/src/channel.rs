//! Line transport over an engine's standard streams.
//!
//! Two background tasks run for the lifetime of the process: one writes
//! queued lines to stdin, one pushes every stdout line to the inbound queue.

use crate::session::SessionError;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the inbound and outbound line queues.
const QUEUE_CAPACITY: usize = 100;

/// Time the engine gets to exit on its own before it is killed.
const EXIT_GRACE: Duration = Duration::from_millis(100);

/// Callback invoked with every line crossing the channel.
pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Optional hooks for lines sent to and received from the engine.
#[derive(Clone, Default)]
pub struct Observers {
    pub on_send: Option<LineObserver>,
    pub on_recv: Option<LineObserver>,
}

impl Observers {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Bidirectional line queues bound to an engine process.
pub struct ProcessChannel {
    child: Option<Child>,
    outbound: Option<mpsc::Sender<String>>,
    inbound: mpsc::Receiver<String>,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

impl ProcessChannel {
    /// Start the executable at `path` and bind its stdin and stdout.
    ///
    /// Stderr is discarded. The process is killed if the channel is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn(path: &Path, observers: Observers) -> Result<Self, SessionError> {
        let spawn_error = |source| SessionError::Spawn {
            path: path.to_path_buf(),
            source,
        };

        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdin not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout not captured")))?;

        tracing::debug!("Spawned engine {:?} (pid {:?})", path, child.id());

        let mut channel = Self::bind(stdout, stdin, observers);
        channel.child = Some(child);
        Ok(channel)
    }

    /// Bind arbitrary streams, e.g. an in-memory engine.
    pub fn bind<R, W>(reader: R, writer: W, observers: Observers) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_CAPACITY);

        let writer = tokio::spawn(write_lines(writer, out_rx, observers.on_send));
        let reader = tokio::spawn(read_lines(reader, in_tx, observers.on_recv));

        Self {
            child: None,
            outbound: Some(out_tx),
            inbound: in_rx,
            writer: Some(writer),
            reader,
        }
    }

    /// Queue `line` for the engine.
    pub async fn send(&self, line: String) -> Result<(), SessionError> {
        match &self.outbound {
            Some(outbound) => outbound.send(line).await.map_err(|_| SessionError::Closed),
            None => Err(SessionError::Closed),
        }
    }

    /// Next line from the engine, or `None` once its output has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Flush pending lines, give the process a moment to exit, then kill it.
    pub async fn shutdown(&mut self) {
        // Closing the queue lets the writer drain what is left and stop.
        self.outbound = None;
        if let Some(writer) = self.writer.take() {
            let _ = tokio::time::timeout(EXIT_GRACE, writer).await;
        }

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("Engine exited with {}", status),
                _ => {
                    tracing::debug!("Engine did not exit in time, killing it");
                    let _ = child.kill().await;
                }
            }
        }

        self.reader.abort();
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if let Some(writer) = &self.writer {
            writer.abort();
        }
        self.reader.abort();
    }
}

async fn write_lines<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<String>,
    on_send: Option<LineObserver>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        if let Some(observer) = &on_send {
            observer(&line);
        }
        tracing::trace!(">> {}", line);

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            tracing::debug!("Engine input closed: {}", e);
            break;
        }
    }
}

async fn read_lines<R>(reader: R, inbound: mpsc::Sender<String>, on_recv: Option<LineObserver>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(observer) = &on_recv {
            observer(&line);
        }
        tracing::trace!("<< {}", line);

        if inbound.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn lines_flow_both_ways() {
        let (engine_side, adapter_side) = duplex(1024);
        let (adapter_read, adapter_write) = tokio::io::split(adapter_side);
        let (engine_read, mut engine_write) = tokio::io::split(engine_side);

        let mut channel = ProcessChannel::bind(adapter_read, adapter_write, Observers::none());

        channel.send("uci".to_string()).await.unwrap();
        let mut engine_lines = BufReader::new(engine_read).lines();
        assert_eq!(engine_lines.next_line().await.unwrap().unwrap(), "uci");

        engine_write.write_all(b"id name Fake\r\nuciok\n").await.unwrap();
        assert_eq!(channel.next_line().await.unwrap(), "id name Fake");
        assert_eq!(channel.next_line().await.unwrap(), "uciok");

        drop(engine_write);
        drop(engine_lines);
        assert_eq!(channel.next_line().await, None);
    }

    #[tokio::test]
    async fn observers_see_every_line() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sent = seen.clone();
        let received = seen.clone();
        let observers = Observers {
            on_send: Some(Arc::new(move |line: &str| {
                sent.lock().unwrap().push(format!("> {}", line))
            })),
            on_recv: Some(Arc::new(move |line: &str| {
                received.lock().unwrap().push(format!("< {}", line))
            })),
        };

        let (engine_side, adapter_side) = duplex(1024);
        let (adapter_read, adapter_write) = tokio::io::split(adapter_side);
        let (engine_read, mut engine_write) = tokio::io::split(engine_side);
        let mut channel = ProcessChannel::bind(adapter_read, adapter_write, observers);

        channel.send("isready".to_string()).await.unwrap();
        let mut engine_lines = BufReader::new(engine_read).lines();
        engine_lines.next_line().await.unwrap();
        engine_write.write_all(b"readyok\n").await.unwrap();
        channel.next_line().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["> isready", "< readyok"]);
    }

    #[tokio::test]
    async fn spawn_missing_binary_fails_synchronously() {
        let result = ProcessChannel::spawn(
            Path::new("/definitely/not/an/engine"),
            Observers::none(),
        );
        assert!(matches!(result, Err(SessionError::Spawn { .. })));
    }

    #[tokio::test]
    async fn send_after_shutdown_is_closed() {
        let (_engine_side, adapter_side) = duplex(64);
        let (adapter_read, adapter_write) = tokio::io::split(adapter_side);
        let mut channel = ProcessChannel::bind(adapter_read, adapter_write, Observers::none());

        channel.shutdown().await;
        assert!(matches!(
            channel.send("quit".to_string()).await,
            Err(SessionError::Closed)
        ));
    }
}
