//! In-memory engines for integration tests.
//!
//! A [`FakeEngine`] answers the UCI handshake, readiness checks and searches
//! over a `tokio::io::duplex` pipe. The move it plays depends only on how
//! many plies the last `position` command carried, so both sides of a game
//! can share one script.

#![allow(dead_code)]

use engine_adapter::channel::{Observers, ProcessChannel};
use engine_adapter::game_pair::{EngineSetup, Launcher};
use engine_adapter::session::SessionError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
use uci::{GuiCommand, SearchBudget};

#[derive(Debug, Clone)]
pub struct FakeEngine {
    pub name: String,
    /// Move played at each ply; `(none)` once the script runs out.
    pub moves: Vec<String>,
    /// Ply at which the engine announces mate in one.
    pub mate_at: Option<usize>,
    /// Answer `isready` with something other than `readyok`.
    pub not_ready: bool,
    /// Exit instead of answering `go`.
    pub crash_on_go: bool,
    /// Lines printed before `uciok`, after the header.
    pub handshake: Vec<String>,
}

impl FakeEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            moves: Vec::new(),
            mate_at: None,
            not_ready: false,
            crash_on_go: false,
            handshake: vec![
                "option name Hash type spin default 16 min 1 max 1024".to_string(),
                "option name Threads type spin default 1 min 1 max 64".to_string(),
            ],
        }
    }

    pub fn playing(mut self, moves: &[&str]) -> Self {
        self.moves = moves.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Bind to a channel and start answering in the background.
    pub fn start(&self, observers: Observers) -> ProcessChannel {
        let (engine_side, adapter_side) = duplex(64 * 1024);
        let (adapter_read, adapter_write) = tokio::io::split(adapter_side);
        tokio::spawn(self.clone().serve(engine_side));
        ProcessChannel::bind(adapter_read, adapter_write, observers)
    }

    async fn serve(self, stream: tokio::io::DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut ply = 0;

        while let Ok(Some(line)) = lines.next_line().await {
            let reply = match GuiCommand::parse(&line) {
                Ok(GuiCommand::Uci) => {
                    let mut reply = vec![format!("id name {}", self.name)];
                    reply.push("id author Tests".to_string());
                    reply.extend(self.handshake.iter().cloned());
                    reply.push("uciok".to_string());
                    reply
                }
                Ok(GuiCommand::IsReady) if self.not_ready => vec!["busy".to_string()],
                Ok(GuiCommand::IsReady) => vec!["readyok".to_string()],
                Ok(GuiCommand::Position { moves, .. }) => {
                    ply = moves.len();
                    continue;
                }
                Ok(GuiCommand::Go(_)) if self.crash_on_go => return,
                Ok(GuiCommand::Go(budget)) => self.search(ply, budget),
                Ok(GuiCommand::Quit) => return,
                _ => continue,
            };

            for line in reply {
                if write.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }

    fn search(&self, ply: usize, budget: SearchBudget) -> Vec<String> {
        let mv = self
            .moves
            .get(ply)
            .cloned()
            .unwrap_or_else(|| "(none)".to_string());
        let depth = match budget {
            SearchBudget::Depth(depth) => depth,
            SearchBudget::Time(_) => 8,
        };
        let score = if self.mate_at == Some(ply) {
            "mate 1".to_string()
        } else {
            format!("cp {}", 10 + ply)
        };
        vec![
            "info string thinking".to_string(),
            format!(
                "info depth {} seldepth {} score {} nodes 4096 nps 100000 time 12 pv {}",
                depth,
                depth + 2,
                score,
                mv
            ),
            format!("bestmove {}", mv),
        ]
    }
}

/// Serves [`FakeEngine`]s by [`EngineSetup::name`] and counts launches.
#[derive(Default)]
pub struct FakeLauncher {
    engines: HashMap<String, FakeEngine>,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(engines: impl IntoIterator<Item = FakeEngine>) -> Self {
        Self {
            engines: engines
                .into_iter()
                .map(|engine| (engine.name.clone(), engine))
                .collect(),
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Launcher for FakeLauncher {
    fn launch(
        &self,
        engine: &EngineSetup,
        observers: Observers,
    ) -> Result<ProcessChannel, SessionError> {
        let fake = self
            .engines
            .get(&engine.name)
            .ok_or_else(|| SessionError::Spawn {
                path: engine.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such engine"),
            })?;
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(fake.start(observers))
    }
}

pub fn setup(name: &str) -> EngineSetup {
    EngineSetup {
        name: name.to_string(),
        path: PathBuf::from(format!("/engines/{}", name)),
        hash: 64,
        threads: 1,
        budget: SearchBudget::Time(50),
    }
}

pub fn launcher(engines: impl IntoIterator<Item = FakeEngine>) -> Arc<FakeLauncher> {
    Arc::new(FakeLauncher::new(engines))
}
