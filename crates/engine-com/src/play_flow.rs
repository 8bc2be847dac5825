//! Messages exchanged with the game server while playing a single game.

use crate::flow::{Decoders, Flow};
use crate::{encode_json, ComError, Command};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("white"),
            Color::Black => f.write_str("black"),
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Color::White),
            "black" | "b" => Ok(Color::Black),
            other => Err(format!("Invalid color '{}', expected white or black", other)),
        }
    }
}

/// Remaining clock time per side, in milliseconds. Negative once a flag
/// has fallen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Clock {
    pub white: i64,
    pub black: i64,
}

impl Clock {
    /// Time left for `color`, zero if overstepped.
    pub fn remaining(&self, color: Color) -> u64 {
        let left = match color {
            Color::White => self.white,
            Color::Black => self.black,
        };
        u64::try_from(left).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub player_color: Color,
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(default)]
    pub time: Clock,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerInfo {
    pub player: String,
    pub color: Color,
    pub game: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub moves: Vec<String>,
    #[serde(default)]
    pub time: Clock,
    pub state: String,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl GameState {
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerError {
    pub message: String,
}

#[derive(Deserialize)]
struct Pong {}

/// Inbound messages of the play flow.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayMessage {
    MoveRequest(MoveRequest),
    PlayerInfo(PlayerInfo),
    GameState(GameState),
    Error(ServerError),
    Pong,
}

/// Outbound commands of the play flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum PlayCommand {
    Register {
        game: String,
        color: Color,
    },
    GameState {
        game: String,
        player: String,
    },
    CheckIn {
        game: String,
        player: String,
    },
    Move {
        game: String,
        player: String,
        #[serde(rename = "move")]
        mv: String,
    },
    Resign {
        game: String,
        player: String,
    },
}

impl Command for PlayCommand {
    fn encode(&self) -> Result<String, ComError> {
        encode_json(self)
    }
}

pub struct PlayFlow {
    decoders: Decoders<PlayMessage>,
}

impl PlayFlow {
    pub fn new() -> Self {
        let decoders = Decoders::new()
            .register("move-request", PlayMessage::MoveRequest)
            .register("player-info", PlayMessage::PlayerInfo)
            .register("game-state", PlayMessage::GameState)
            .register("error", PlayMessage::Error)
            .register::<Pong>("pong", |_| PlayMessage::Pong);
        Self { decoders }
    }
}

impl Default for PlayFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl Flow for PlayFlow {
    type Message = PlayMessage;

    fn decode(&self, key: &str, frame: &str) -> Result<PlayMessage, ComError> {
        self.decoders.decode(key, frame)
    }
}
