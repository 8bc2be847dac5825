//! Engine option declarations (`option name ... type ...`).

use crate::{GuiCommand, UciError};
use std::str::FromStr;

/// Keywords that end a multi-token value such as a name or default.
const KEYWORDS: &[&str] = &["name", "type", "default", "min", "max", "var", "value"];

/// The kind of value an option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Boolean (`check`).
    Check,
    /// Integer within `min..=max` (`spin`).
    Spin,
    /// One of the declared `var` values (`combo`).
    Combo,
    /// Action without a value (`button`).
    Button,
    /// Free text (`string`).
    String,
}

impl FromStr for OptionKind {
    type Err = UciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check" => Ok(OptionKind::Check),
            "spin" => Ok(OptionKind::Spin),
            "combo" => Ok(OptionKind::Combo),
            "button" => Ok(OptionKind::Button),
            "string" => Ok(OptionKind::String),
            other => Err(UciError::InvalidOption(format!("unknown type '{}'", other))),
        }
    }
}

/// A configurable engine option, as declared during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDescriptor {
    pub name: String,
    pub kind: OptionKind,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub default: Option<String>,
    /// Allowed values for combo options, in declaration order.
    pub vars: Vec<String>,
}

impl OptionDescriptor {
    /// Parse an `option ...` line.
    ///
    /// `type`, `min` and `max` take exactly one token. `name`, `default` and
    /// `var` take every token up to the next keyword, so names like
    /// `Skill Level` survive intact.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        if parts.first() != Some(&"option") {
            return Err(UciError::InvalidOption(format!(
                "not an option line: '{}'",
                line
            )));
        }

        let mut name = None;
        let mut kind = None;
        let mut min = None;
        let mut max = None;
        let mut default = None;
        let mut vars = Vec::new();
        let mut i = 1;

        while i < parts.len() {
            match parts[i] {
                "type" => {
                    kind = Some(single_token(&parts, i)?.parse::<OptionKind>()?);
                    i += 2;
                }
                "min" => {
                    min = Some(parse_bound(single_token(&parts, i)?)?);
                    i += 2;
                }
                "max" => {
                    max = Some(parse_bound(single_token(&parts, i)?)?);
                    i += 2;
                }
                key @ ("name" | "default" | "var") => {
                    let value = read_until_keyword(&parts, i + 1);
                    i += value.len() + 1;
                    let value = value.join(" ");
                    match key {
                        "name" => name = Some(value),
                        "default" => default = Some(value),
                        _ => vars.push(value),
                    }
                }
                other => {
                    return Err(UciError::InvalidOption(format!(
                        "unknown key '{}' in '{}'",
                        other, line
                    )));
                }
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| UciError::InvalidOption("name is missing".to_string()))?;
        let kind = kind.ok_or_else(|| UciError::InvalidOption("type is missing".to_string()))?;

        Ok(Self {
            name,
            kind,
            min,
            max,
            default,
            vars,
        })
    }

    /// Build the `setoption` command assigning `value` to this option.
    pub fn set_command(&self, value: impl Into<String>) -> GuiCommand {
        let value = match self.kind {
            OptionKind::Button => None,
            _ => Some(value.into()),
        };
        GuiCommand::SetOption {
            name: self.name.clone(),
            value,
        }
    }
}

fn single_token<'a>(parts: &[&'a str], key_idx: usize) -> Result<&'a str, UciError> {
    parts.get(key_idx + 1).copied().ok_or_else(|| {
        UciError::InvalidOption(format!("missing value for '{}'", parts[key_idx]))
    })
}

fn parse_bound(token: &str) -> Result<i64, UciError> {
    token
        .parse()
        .map_err(|_| UciError::InvalidOption(format!("invalid bound '{}'", token)))
}

fn read_until_keyword<'p, 'a>(parts: &'p [&'a str], start: usize) -> &'p [&'a str] {
    let rest = parts.get(start..).unwrap_or(&[]);
    let end = rest
        .iter()
        .position(|p| KEYWORDS.contains(p))
        .unwrap_or(rest.len());
    &rest[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_spin_with_multi_word_name() {
        let opt =
            OptionDescriptor::parse("option name Skill Level type spin default 10 min 0 max 20")
                .unwrap();

        assert_eq!(opt.name, "Skill Level");
        assert_eq!(opt.kind, OptionKind::Spin);
        assert_eq!(opt.default.as_deref(), Some("10"));
        assert_eq!(opt.min, Some(0));
        assert_eq!(opt.max, Some(20));
        assert!(opt.vars.is_empty());
    }

    #[test]
    fn parse_combo_with_vars() {
        let opt = OptionDescriptor::parse(
            "option name Analysis Contempt type combo default Both var Off var White var Black var Both",
        )
        .unwrap();

        assert_eq!(opt.name, "Analysis Contempt");
        assert_eq!(opt.kind, OptionKind::Combo);
        assert_eq!(opt.default.as_deref(), Some("Both"));
        assert_eq!(opt.vars, vec!["Off", "White", "Black", "Both"]);
    }

    #[test]
    fn parse_multi_word_default() {
        let opt =
            OptionDescriptor::parse("option name Book File type string default my book.bin")
                .unwrap();
        assert_eq!(opt.default.as_deref(), Some("my book.bin"));
    }

    #[test]
    fn parse_empty_string_default() {
        let opt = OptionDescriptor::parse("option name Debug Log File type string default")
            .unwrap();
        assert_eq!(opt.name, "Debug Log File");
        assert_eq!(opt.default.as_deref(), Some(""));
    }

    #[test]
    fn parse_button() {
        let opt = OptionDescriptor::parse("option name Clear Hash type button").unwrap();
        assert_eq!(opt.kind, OptionKind::Button);
        assert_eq!(opt.default, None);
    }

    #[test]
    fn reject_unknown_type() {
        assert!(OptionDescriptor::parse("option name Foo type slider default 1").is_err());
    }

    #[test]
    fn reject_missing_type() {
        assert!(OptionDescriptor::parse("option name Foo default 1").is_err());
    }

    #[test]
    fn reject_bad_bound() {
        assert!(OptionDescriptor::parse("option name Hash type spin min x max 5").is_err());
    }

    #[test]
    fn reject_trailing_type_without_value() {
        assert!(OptionDescriptor::parse("option name Hash type").is_err());
    }

    #[test]
    fn reject_unknown_key() {
        assert!(OptionDescriptor::parse("option name Hash type spin colour blue").is_err());
    }

    #[test]
    fn set_command_carries_value() {
        let opt = OptionDescriptor::parse("option name Hash type spin default 16 min 1 max 1024")
            .unwrap();
        assert_eq!(opt.set_command("128").to_uci(), "setoption name Hash value 128");
    }

    #[test]
    fn set_command_button_has_no_value() {
        let opt = OptionDescriptor::parse("option name Clear Hash type button").unwrap();
        assert_eq!(opt.set_command("ignored").to_uci(), "setoption name Clear Hash");
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in "option( [a-z0-9]{1,6}){0,10}") {
            let _ = OptionDescriptor::parse(&line);
        }

        #[test]
        fn multi_word_names_survive(words in proptest::collection::vec("[A-Z][a-z]{1,8}", 1..4)) {
            let name = words.join(" ");
            let line = format!("option name {} type check default false", name);
            let opt = OptionDescriptor::parse(&line).unwrap();
            prop_assert_eq!(opt.name, name);
            prop_assert_eq!(opt.kind, OptionKind::Check);
        }
    }
}
