//! UCI protocol session with a single engine process.
//!
//! An [`EngineSession`] owns its [`ProcessChannel`] and walks the protocol
//! state machine:
//!
//! ```text
//! Uninitialized -> Handshaking -> Ready <-> Searching
//!                                   |
//!                                   v
//!                              Terminated
//! ```
//!
//! Every read blocks until the engine produces the expected line. A read
//! timeout can be configured with [`EngineSession::with_timeout`]; without
//! one a hung engine stalls its caller.

use crate::channel::ProcessChannel;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uci::{EngineMessage, GuiCommand, OptionDescriptor, SearchBudget, SearchTelemetry};

/// Errors raised while talking to an engine.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The engine executable could not be started.
    #[error("Failed to launch engine {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The engine did not complete the `uci` / `uciok` exchange.
    #[error("Engine handshake failed: {0}")]
    Handshake(String),
    /// The engine did not answer `isready` with `readyok`.
    #[error("Engine is not ready")]
    NotReady,
    /// The engine's output ended while a reply was expected.
    #[error("Engine closed the connection")]
    Closed,
    /// No line arrived within the configured timeout.
    #[error("Engine did not respond within {0:?}")]
    Timeout(Duration),
    /// The operation is not valid in the session's current state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Handshaking,
    Ready,
    Searching,
    Terminated,
}

/// A running engine and everything learned about it during the handshake.
pub struct EngineSession {
    channel: ProcessChannel,
    state: SessionState,
    header: Option<String>,
    name: Option<String>,
    options: Vec<OptionDescriptor>,
    timeout: Option<Duration>,
}

impl EngineSession {
    pub fn new(channel: ProcessChannel) -> Self {
        Self {
            channel,
            state: SessionState::Uninitialized,
            header: None,
            name: None,
            options: Vec::new(),
            timeout: None,
        }
    }

    /// Bound every read by `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The first line the engine printed, kept verbatim.
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Name from `id name`, if the engine sent one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn options(&self) -> &[OptionDescriptor] {
        &self.options
    }

    /// Look up a declared option, ignoring case.
    pub fn option(&self, name: &str) -> Option<&OptionDescriptor> {
        self.options
            .iter()
            .find(|opt| opt.name.eq_ignore_ascii_case(name))
    }

    /// Identify the engine and collect its options.
    ///
    /// Sends `uci`, stores the first reply line as the header, then reads
    /// until `uciok`. Option lines that fail to parse are skipped.
    pub async fn handshake(&mut self) -> Result<(), SessionError> {
        self.expect_state("handshake", SessionState::Uninitialized)?;
        self.state = SessionState::Handshaking;

        self.send(&GuiCommand::Uci).await?;

        let mut done = false;
        while !done {
            let line = self.read_handshake_line().await?;
            if self.header.is_none() {
                self.header = Some(line.clone());
            }
            match EngineMessage::parse(&line) {
                EngineMessage::UciOk => done = true,
                EngineMessage::Option(option) => self.options.push(option),
                EngineMessage::Id { name: Some(name), .. } => self.name = Some(name),
                EngineMessage::Other(other) if other.starts_with("option") => {
                    tracing::debug!("Skipping malformed option line: {}", other);
                }
                _ => {}
            }
        }

        tracing::debug!(
            "Handshake complete: {} ({} options)",
            self.name.as_deref().unwrap_or("unnamed engine"),
            self.options.len()
        );
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Round-trip `isready` and report whether `readyok` came back.
    pub async fn is_ready(&mut self) -> Result<bool, SessionError> {
        self.expect_state("check readiness", SessionState::Ready)?;
        self.send(&GuiCommand::IsReady).await?;
        let line = self.read_line().await?;
        Ok(line.trim() == "readyok")
    }

    /// Assign `value` to `option`. Button options ignore the value.
    pub async fn set_option(
        &mut self,
        option: &OptionDescriptor,
        value: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.expect_state("set an option", SessionState::Ready)?;
        self.send(&option.set_command(value)).await
    }

    pub async fn new_game(&mut self) -> Result<(), SessionError> {
        self.expect_state("start a new game", SessionState::Ready)?;
        self.send(&GuiCommand::UciNewGame).await
    }

    /// Set up `fen` (or the start position) followed by `moves`.
    pub async fn set_position(
        &mut self,
        fen: Option<&str>,
        moves: &[String],
    ) -> Result<(), SessionError> {
        self.expect_state("set the position", SessionState::Ready)?;
        self.send(&GuiCommand::Position {
            fen: fen.map(str::to_string),
            moves: moves.to_vec(),
        })
        .await
    }

    /// Start position followed by `moves`.
    pub async fn set_moves(&mut self, moves: &[String]) -> Result<(), SessionError> {
        self.set_position(None, moves).await
    }

    /// Search the current position and return the engine's choice.
    ///
    /// The telemetry is parsed from the line right before `bestmove`; when
    /// there is none, only the move fields are set.
    pub async fn request_move(
        &mut self,
        budget: SearchBudget,
    ) -> Result<SearchTelemetry, SessionError> {
        self.expect_state("request a move", SessionState::Ready)?;
        self.send(&GuiCommand::Go(budget)).await?;
        self.state = SessionState::Searching;

        let mut previous: Option<String> = None;
        loop {
            let line = self.read_line().await?;
            if !EngineMessage::is_bestmove(&line) {
                previous = Some(line);
                continue;
            }

            let mut telemetry = previous
                .as_deref()
                .map(SearchTelemetry::parse)
                .unwrap_or_default();
            if let EngineMessage::BestMove { mv, ponder } = EngineMessage::parse(&line) {
                telemetry.mv = mv;
                telemetry.ponder = ponder;
            }

            self.state = SessionState::Ready;
            return Ok(telemetry);
        }
    }

    /// Ask a running search to finish early.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Terminated {
            return Err(SessionError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        }
        self.send(&GuiCommand::Stop).await
    }

    /// Send `quit` and end the process. Safe to call more than once.
    pub async fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        let _ = self.send(&GuiCommand::Quit).await;
        self.channel.shutdown().await;
        self.state = SessionState::Terminated;
    }

    /// Consume the session, terminating the engine.
    pub async fn close(mut self) {
        self.terminate().await;
    }

    async fn send(&self, command: &GuiCommand) -> Result<(), SessionError> {
        self.channel.send(command.to_uci()).await
    }

    async fn read_line(&mut self) -> Result<String, SessionError> {
        let line = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.channel.next_line())
                .await
                .map_err(|_| SessionError::Timeout(limit))?,
            None => self.channel.next_line().await,
        };
        line.ok_or(SessionError::Closed)
    }

    async fn read_handshake_line(&mut self) -> Result<String, SessionError> {
        self.read_line().await.map_err(|e| match e {
            SessionError::Closed => {
                SessionError::Handshake("engine exited before uciok".to_string())
            }
            other => other,
        })
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: SessionState,
    ) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
