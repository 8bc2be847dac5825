//! UCI (Universal Chess Interface) line codec for driving external engines.
//!
//! This crate covers the GUI side of the protocol: encoding the commands an
//! adapter sends to an engine process and classifying the lines the engine
//! writes back. It performs no I/O.
//!
//! # Outbound commands
//!
//! - `uci` - Identify the engine and list its options
//! - `ucinewgame` - Reset engine state for a new game
//! - `isready` / `readyok` - Synchronization
//! - `position (startpos | fen <fen>) [moves <move>...]` - Set position
//! - `go (movetime <ms> | depth <d>)` - Start search
//! - `setoption name <name> [value <value>]` - Configure an option
//! - `stop` / `quit`
//!
//! # Inbound lines
//!
//! - `id ...` - Free-form identification
//! - `option name <name> type <type> ...` - Option declarations, see [`OptionDescriptor`]
//! - `info ...` - Search telemetry, see [`SearchTelemetry`]
//! - `bestmove <move> [ponder <move>]`
//! - `uciok` / `readyok`

mod command;
mod info;
mod option;

pub use command::{GuiCommand, SearchBudget};
pub use info::{parse_score, Score, ScoreKind, SearchTelemetry};
pub use option::{OptionDescriptor, OptionKind};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UciError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid option declaration: {0}")]
    InvalidOption(String),
}

/// Lines sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification (`id name ...`, `id author ...`).
    Id { name: Option<String>, author: Option<String> },
    /// Option list complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Option declaration.
    Option(OptionDescriptor),
    /// Search information.
    Info(SearchTelemetry),
    /// Best move found.
    BestMove { mv: String, ponder: Option<String> },
    /// Anything else, including option lines that failed to parse.
    Other(String),
}

impl EngineMessage {
    /// Classify a single engine output line.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();

        match parts.next().unwrap_or("") {
            "uciok" => EngineMessage::UciOk,
            "readyok" => EngineMessage::ReadyOk,
            "bestmove" => {
                let mv = parts.next().unwrap_or("").to_string();
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().map(str::to_string),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            "id" => {
                let rest: Vec<&str> = parts.collect();
                match rest.split_first() {
                    Some((&"name", value)) => EngineMessage::Id {
                        name: Some(value.join(" ")),
                        author: None,
                    },
                    Some((&"author", value)) => EngineMessage::Id {
                        name: None,
                        author: Some(value.join(" ")),
                    },
                    _ => EngineMessage::Other(trimmed.to_string()),
                }
            }
            "option" => match OptionDescriptor::parse(trimmed) {
                Ok(desc) => EngineMessage::Option(desc),
                Err(_) => EngineMessage::Other(trimmed.to_string()),
            },
            "info" => EngineMessage::Info(SearchTelemetry::parse(trimmed)),
            _ => EngineMessage::Other(trimmed.to_string()),
        }
    }

    /// Whether this line terminates a search request.
    pub fn is_bestmove(line: &str) -> bool {
        line.trim_start().starts_with("bestmove")
    }
}
