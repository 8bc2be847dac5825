//! Plays a single game on the game server.

use crate::session::{EngineSession, SessionError};
use crate::AdapterError;
use engine_com::play_flow::{Color, GameState, MoveRequest, PlayCommand, PlayFlow, PlayMessage};
use engine_com::{Client, ComError, Event};
use uci::SearchBudget;

/// Budget when less than [`LOW_CLOCK_MS`] remains.
const BLITZ_MS: u64 = 100;
const LOW_CLOCK_MS: u64 = 3_000;
/// Budget when less than [`MEDIUM_CLOCK_MS`] remains.
const QUICK_MS: u64 = 300;
const MEDIUM_CLOCK_MS: u64 = 10_000;
/// Full moves a game is expected to last.
const EXPECTED_MOVES: u64 = 40;

/// Time to spend on the next move, in milliseconds.
///
/// `moves_played` counts plies. Short clocks get a fixed budget; otherwise
/// the clock is spread over the moves left until the expected game length,
/// or 2% of it once the game runs longer than that.
pub fn move_time(remaining_ms: u64, moves_played: usize) -> u64 {
    if remaining_ms < LOW_CLOCK_MS {
        return BLITZ_MS;
    }
    if remaining_ms < MEDIUM_CLOCK_MS {
        return QUICK_MS;
    }

    let full_moves = moves_played as u64 / 2;
    if full_moves < EXPECTED_MOVES {
        remaining_ms / (EXPECTED_MOVES - full_moves)
    } else {
        remaining_ms / 50
    }
}

/// How the game ended, as far as the server told us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameOutcome {
    /// The server reported the game as no longer active.
    pub finished: bool,
    pub winner: Option<String>,
    pub reason: Option<String>,
    pub moves: Vec<String>,
}

impl From<GameState> for GameOutcome {
    fn from(state: GameState) -> Self {
        Self {
            finished: !state.is_active(),
            winner: state.winner,
            reason: state.reason,
            moves: state.moves,
        }
    }
}

/// Relays move requests for one color between the server and an engine.
pub struct Driver {
    client: Client<PlayFlow>,
    engine: EngineSession,
    game: String,
    color: Color,
    player: Option<String>,
}

impl Driver {
    pub fn new(
        client: Client<PlayFlow>,
        engine: EngineSession,
        game: impl Into<String>,
        color: Color,
    ) -> Self {
        Self {
            client,
            engine,
            game: game.into(),
            color,
            player: None,
        }
    }

    /// Rejoin as an already registered player instead of registering anew.
    pub fn with_player(mut self, player: impl Into<String>) -> Self {
        self.player = Some(player.into());
        self
    }

    /// Play until the game ends or the server disconnects.
    ///
    /// The engine is terminated and the connection closed on every path.
    pub async fn run(mut self) -> Result<GameOutcome, AdapterError> {
        let result = self.play().await;
        self.engine.terminate().await;
        self.client.close().await;

        if let Ok(outcome) = &result {
            tracing::info!(
                "Game {} over after {} plies: winner {}, reason {}",
                self.game,
                outcome.moves.len(),
                outcome.winner.as_deref().unwrap_or("none"),
                outcome.reason.as_deref().unwrap_or("unknown")
            );
        }
        result
    }

    async fn play(&mut self) -> Result<GameOutcome, AdapterError> {
        self.engine.handshake().await?;
        if !self.engine.is_ready().await? {
            return Err(SessionError::NotReady.into());
        }
        self.engine.new_game().await?;

        let player = self.join().await?;
        tracing::info!("Playing {} in game {} as {}", self.color, self.game, player);

        let mut last_state: Option<GameState> = None;
        loop {
            let message = match self.client.next_event().await {
                Some(Event::Message(message)) => message,
                Some(Event::Error(ComError::Closed)) | None => break,
                Some(Event::Error(e)) => {
                    tracing::warn!("Connection error: {}", e);
                    continue;
                }
            };

            match message {
                PlayMessage::MoveRequest(request) => self.answer(&player, request).await?,
                PlayMessage::GameState(state) => {
                    if !state.is_active() {
                        return Ok(state.into());
                    }
                    last_state = Some(state);
                }
                PlayMessage::Error(error) => tracing::warn!("Server error: {}", error.message),
                PlayMessage::PlayerInfo(_) | PlayMessage::Pong => {}
            }
        }

        tracing::info!("Game server closed the connection");
        Ok(last_state.map(GameOutcome::from).unwrap_or_default())
    }

    /// Register for the game, or check in with a known player id.
    async fn join(&mut self) -> Result<String, AdapterError> {
        if let Some(player) = &self.player {
            self.client.send(PlayCommand::CheckIn {
                game: self.game.clone(),
                player: player.clone(),
            })?;
            return Ok(player.clone());
        }

        self.client.send(PlayCommand::Register {
            game: self.game.clone(),
            color: self.color,
        })?;

        loop {
            match self.client.next_event().await {
                Some(Event::Message(PlayMessage::PlayerInfo(info))) => {
                    self.player = Some(info.player.clone());
                    return Ok(info.player);
                }
                Some(Event::Message(other)) => {
                    return Err(AdapterError::UnexpectedMessage(format!(
                        "{:?} instead of player information",
                        other
                    )))
                }
                Some(Event::Error(ComError::Closed)) | None => {
                    return Err(ComError::Closed.into());
                }
                Some(Event::Error(e)) => tracing::warn!("Connection error: {}", e),
            }
        }
    }

    async fn answer(&mut self, player: &str, request: MoveRequest) -> Result<(), AdapterError> {
        if request.player_color != self.color {
            tracing::warn!(
                "Ignoring move request for {} while playing {}",
                request.player_color,
                self.color
            );
            return Ok(());
        }

        let remaining = request.time.remaining(self.color);
        let budget = move_time(remaining, request.moves.len());
        tracing::debug!("{} ms left, thinking for {} ms", remaining, budget);

        self.engine.set_moves(&request.moves).await?;
        let reply = self.engine.request_move(SearchBudget::Time(budget)).await?;

        self.client.send(PlayCommand::Move {
            game: self.game.clone(),
            player: player.to_string(),
            mv: reply.mv,
        })?;
        Ok(())
    }
}
