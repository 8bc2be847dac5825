//! Two games between the same engines with colors swapped.
//!
//! Every game starts fresh engine processes and terminates them once the
//! game ends, however it ends. A game is over when the engine to move
//! reports no move, announces mate in one, or the ply cap is reached. Move
//! legality is left to the engines.

use crate::channel::{Observers, ProcessChannel};
use crate::session::{EngineSession, SessionError};
use engine_com::test_flow::{GameLogs, LogEntry, LogKind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uci::{SearchBudget, SearchTelemetry};

/// Safety cap on the length of a game, in plies.
pub const MAX_PLIES: usize = 250;

/// One engine as configured for a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSetup {
    pub name: String,
    pub path: PathBuf,
    /// Hash table size in MiB.
    pub hash: u32,
    pub threads: u32,
    pub budget: SearchBudget,
}

/// Starts engine processes.
///
/// Tests substitute in-memory engines here.
pub trait Launcher: Send + Sync {
    fn launch(
        &self,
        engine: &EngineSetup,
        observers: Observers,
    ) -> Result<ProcessChannel, SessionError>;
}

/// Launches the engine binary at [`EngineSetup::path`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryLauncher;

impl Launcher for BinaryLauncher {
    fn launch(
        &self,
        engine: &EngineSetup,
        observers: Observers,
    ) -> Result<ProcessChannel, SessionError> {
        ProcessChannel::spawn(&engine.path, observers)
    }
}

/// Moves and per-engine telemetry of one game.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameRecord {
    /// Index of the engine that played white.
    pub white: usize,
    pub moves: Vec<String>,
    /// Telemetry per engine (not per color), one entry per ply it played.
    pub history: [Vec<SearchTelemetry>; 2],
}

impl GameRecord {
    fn new(white: usize) -> Self {
        Self {
            white,
            ..Self::default()
        }
    }
}

/// A finished game and the lines each engine exchanged during it.
#[derive(Debug, Clone, Default)]
pub struct GameResult {
    pub record: GameRecord,
    /// Transcript per engine.
    pub logs: GameLogs,
}

/// Lines exchanged with one engine, captured through channel observers.
#[derive(Clone, Default)]
pub struct Transcript {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Transcript {
    pub fn observers(&self) -> Observers {
        let sent = self.clone();
        let received = self.clone();
        Observers {
            on_send: Some(Arc::new(move |line: &str| sent.push(LogKind::Send, line))),
            on_recv: Some(Arc::new(move |line: &str| received.push(LogKind::Recv, line))),
        }
    }

    fn push(&self, kind: LogKind, line: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(LogEntry {
            kind,
            value: line.to_string(),
        });
    }

    /// Take everything recorded so far.
    pub fn take(&self) -> Vec<LogEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *entries)
    }
}

/// Plays both color assignments between two engines.
#[derive(Clone)]
pub struct GamePair {
    launcher: Arc<dyn Launcher>,
    engines: Arc<[EngineSetup; 2]>,
    timeout: Option<Duration>,
}

impl GamePair {
    pub fn new(launcher: Arc<dyn Launcher>, engines: Arc<[EngineSetup; 2]>) -> Self {
        Self {
            launcher,
            engines,
            timeout: None,
        }
    }

    /// Read timeout applied to every engine session.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Play engine 0 as white, then engine 1 as white.
    pub async fn play(&self) -> Result<[GameResult; 2], SessionError> {
        let first = self.play_game(0).await?;
        let second = self.play_game(1).await?;
        Ok([first, second])
    }

    /// Play one game with engine `white` moving first.
    pub async fn play_game(&self, white: usize) -> Result<GameResult, SessionError> {
        let transcripts = [Transcript::default(), Transcript::default()];
        let mut sessions = Vec::with_capacity(2);

        for (engine, transcript) in self.engines.iter().zip(&transcripts) {
            match self.launcher.launch(engine, transcript.observers()) {
                Ok(channel) => {
                    sessions.push(EngineSession::new(channel).with_timeout(self.timeout))
                }
                Err(e) => {
                    terminate_all(&mut sessions).await;
                    return Err(e);
                }
            }
        }

        let outcome = self.run_game(&mut sessions, white).await;
        terminate_all(&mut sessions).await;

        let record = outcome?;
        tracing::debug!(
            "Game finished after {} plies ({} played white)",
            record.moves.len(),
            self.engines[white].name
        );
        Ok(GameResult {
            record,
            logs: transcripts.iter().map(Transcript::take).collect(),
        })
    }

    async fn run_game(
        &self,
        sessions: &mut [EngineSession],
        white: usize,
    ) -> Result<GameRecord, SessionError> {
        for (session, engine) in sessions.iter_mut().zip(self.engines.iter()) {
            prepare(session, engine).await?;
        }

        let mut record = GameRecord::new(white);
        let mut mover = white;

        while record.moves.len() < MAX_PLIES {
            let session = &mut sessions[mover];
            session.set_moves(&record.moves).await?;
            let reply = session.request_move(self.engines[mover].budget).await?;

            let game_over = reply.is_no_move() || reply.is_mate_in_one();
            record.moves.push(reply.mv.clone());
            record.history[mover].push(reply);

            if game_over {
                break;
            }
            mover = 1 - mover;
        }

        Ok(record)
    }
}

/// Handshake, readiness check, resource options and `ucinewgame`.
async fn prepare(session: &mut EngineSession, engine: &EngineSetup) -> Result<(), SessionError> {
    session.handshake().await?;
    if !session.is_ready().await? {
        return Err(SessionError::NotReady);
    }

    // Zero means the batch left the engine's default in place.
    for (name, value) in [("Hash", engine.hash), ("Threads", engine.threads)] {
        if value == 0 {
            continue;
        }
        if let Some(option) = session.option(name).cloned() {
            session.set_option(&option, value.to_string()).await?;
        }
    }

    session.new_game().await
}

async fn terminate_all(sessions: &mut [EngineSession]) {
    for session in sessions {
        session.terminate().await;
    }
}
