//! UCI command encoding and parsing.

use crate::UciError;
use std::fmt;

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Ask the engine to identify itself and declare its options.
    Uci,
    /// Reset engine state before a new game.
    UciNewGame,
    /// Check if engine is ready.
    IsReady,
    /// Set up position. `fen: None` means the standard starting position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(SearchBudget),
    /// Configure an engine option. Button options carry no value.
    SetOption {
        name: String,
        value: Option<String>,
    },
    /// Stop calculating.
    Stop,
    /// Quit the engine.
    Quit,
    /// Unknown command (for forward compatibility).
    Unknown(String),
}

/// How long a single search may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    /// Search for exactly this time in milliseconds.
    Time(u64),
    /// Search to this depth in plies.
    Depth(u32),
}

impl GuiCommand {
    /// Format command for the engine's stdin (without trailing newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::UciNewGame => "ucinewgame".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(fen) => format!("position fen {}", fen),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(SearchBudget::Time(ms)) => format!("go movetime {}", ms),
            GuiCommand::Go(SearchBudget::Depth(depth)) => format!("go depth {}", depth),
            GuiCommand::SetOption { name, value } => match value {
                Some(v) => format!("setoption name {} value {}", name, v),
                None => format!("setoption name {}", name),
            },
            GuiCommand::Stop => "stop".to_string(),
            GuiCommand::Quit => "quit".to_string(),
            GuiCommand::Unknown(raw) => raw.clone(),
        }
    }

    /// Parse a UCI command string.
    pub fn parse(input: &str) -> Result<Self, UciError> {
        let input = input.trim();
        let mut parts = input.split_whitespace();

        let cmd = parts.next().unwrap_or("");

        match cmd {
            "uci" => Ok(GuiCommand::Uci),
            "ucinewgame" => Ok(GuiCommand::UciNewGame),
            "isready" => Ok(GuiCommand::IsReady),
            "stop" => Ok(GuiCommand::Stop),
            "quit" => Ok(GuiCommand::Quit),
            "position" => Self::parse_position(parts),
            "go" => Self::parse_go(parts),
            "setoption" => Self::parse_setoption(parts),
            "" => Ok(GuiCommand::Unknown(String::new())),
            _ => Ok(GuiCommand::Unknown(input.to_string())),
        }
    }

    fn parse_position<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let fen = match parts.next() {
            Some("startpos") => {
                // Skip ahead to the move list, if any
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                }
                None
            }
            Some("fen") => {
                let mut fen_parts = Vec::new();
                for part in parts.by_ref() {
                    if part == "moves" {
                        break;
                    }
                    fen_parts.push(part);
                }
                if fen_parts.is_empty() {
                    return Err(UciError::ParseError("Empty FEN".to_string()));
                }
                Some(fen_parts.join(" "))
            }
            Some(other) => {
                return Err(UciError::ParseError(format!(
                    "Expected 'startpos' or 'fen', got '{}'",
                    other
                )));
            }
            None => {
                return Err(UciError::ParseError(
                    "Expected 'startpos' or 'fen'".to_string(),
                ));
            }
        };

        let moves = parts.map(str::to_string).collect();
        Ok(GuiCommand::Position { fen, moves })
    }

    fn parse_go<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let key = parts.next();
        let value = parts.next();

        match (key, value) {
            (Some("movetime"), Some(v)) => v
                .parse()
                .map(|ms| GuiCommand::Go(SearchBudget::Time(ms)))
                .map_err(|_| UciError::ParseError(format!("Invalid movetime '{}'", v))),
            (Some("depth"), Some(v)) => v
                .parse()
                .map(|d| GuiCommand::Go(SearchBudget::Depth(d)))
                .map_err(|_| UciError::ParseError(format!("Invalid depth '{}'", v))),
            _ => Err(UciError::InvalidCommand(
                "go requires movetime or depth".to_string(),
            )),
        }
    }

    fn parse_setoption<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Self, UciError> {
        let parts: Vec<&str> = parts.collect();
        if parts.first() != Some(&"name") {
            return Err(UciError::ParseError(
                "setoption requires 'name'".to_string(),
            ));
        }

        let value_idx = parts.iter().position(|&p| p == "value");
        let name_end = value_idx.unwrap_or(parts.len());
        let name = parts[1..name_end].join(" ");
        if name.is_empty() {
            return Err(UciError::ParseError("Empty option name".to_string()));
        }
        let value = value_idx.map(|idx| parts[idx + 1..].join(" "));

        Ok(GuiCommand::SetOption { name, value })
    }
}

impl fmt::Display for GuiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uci() {
        assert_eq!(GuiCommand::parse("uci").unwrap(), GuiCommand::Uci);
    }

    #[test]
    fn parse_isready() {
        assert_eq!(GuiCommand::parse("isready").unwrap(), GuiCommand::IsReady);
    }

    #[test]
    fn encode_position_startpos() {
        let cmd = GuiCommand::Position {
            fen: None,
            moves: vec![],
        };
        assert_eq!(cmd.to_uci(), "position startpos");
    }

    #[test]
    fn encode_position_with_moves() {
        let cmd = GuiCommand::Position {
            fen: None,
            moves: vec!["e2e4".to_string(), "e7e5".to_string()],
        };
        assert_eq!(cmd.to_uci(), "position startpos moves e2e4 e7e5");
    }

    #[test]
    fn encode_position_fen_with_moves() {
        let cmd = GuiCommand::Position {
            fen: Some("8/8/8/8/8/8/8/K6k w - - 0 1".to_string()),
            moves: vec!["a1a2".to_string()],
        };
        assert_eq!(
            cmd.to_uci(),
            "position fen 8/8/8/8/8/8/8/K6k w - - 0 1 moves a1a2"
        );
    }

    #[test]
    fn parse_position_startpos_with_moves() {
        let cmd = GuiCommand::parse("position startpos moves e2e4 e7e5").unwrap();
        assert_eq!(
            cmd,
            GuiCommand::Position {
                fen: None,
                moves: vec!["e2e4".to_string(), "e7e5".to_string()]
            }
        );
    }

    #[test]
    fn parse_position_fen() {
        let cmd = GuiCommand::parse(
            "position fen rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        )
        .unwrap();
        assert_eq!(
            cmd,
            GuiCommand::Position {
                fen: Some(
                    "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string()
                ),
                moves: vec![]
            }
        );
    }

    #[test]
    fn encode_go_budgets() {
        assert_eq!(
            GuiCommand::Go(SearchBudget::Time(250)).to_uci(),
            "go movetime 250"
        );
        assert_eq!(GuiCommand::Go(SearchBudget::Depth(12)).to_uci(), "go depth 12");
    }

    #[test]
    fn parse_go_movetime() {
        assert_eq!(
            GuiCommand::parse("go movetime 1000").unwrap(),
            GuiCommand::Go(SearchBudget::Time(1000))
        );
    }

    #[test]
    fn parse_go_without_budget_fails() {
        assert!(GuiCommand::parse("go infinite").is_err());
    }

    #[test]
    fn encode_setoption() {
        let with_value = GuiCommand::SetOption {
            name: "Skill Level".to_string(),
            value: Some("10".to_string()),
        };
        assert_eq!(with_value.to_uci(), "setoption name Skill Level value 10");

        let button = GuiCommand::SetOption {
            name: "Clear Hash".to_string(),
            value: None,
        };
        assert_eq!(button.to_uci(), "setoption name Clear Hash");
    }

    #[test]
    fn parse_setoption_multi_word_name() {
        assert_eq!(
            GuiCommand::parse("setoption name Skill Level value 10").unwrap(),
            GuiCommand::SetOption {
                name: "Skill Level".to_string(),
                value: Some("10".to_string())
            }
        );
    }

    #[test]
    fn parse_unknown_is_preserved() {
        assert_eq!(
            GuiCommand::parse("ponderhit").unwrap(),
            GuiCommand::Unknown("ponderhit".to_string())
        );
    }
}
