//! Search telemetry (`info ...` lines).

use serde::{Serialize, Serializer};

/// Whether a score is measured in centipawns or moves to mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreKind {
    #[default]
    Centipawns,
    Mate,
}

// The report wire format encodes the kind as 0 (centipawns) or 1 (mate).
impl Serialize for ScoreKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            ScoreKind::Centipawns => 0,
            ScoreKind::Mate => 1,
        })
    }
}

/// Score in centipawns or mate distance, with optional bound flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Score {
    #[serde(rename = "Type")]
    pub kind: ScoreKind,
    /// Centipawns (100 = 1 pawn), or mate in N moves (negative = engine is mated).
    pub value: i32,
    pub lowerbound: bool,
    pub upperbound: bool,
}

impl Score {
    pub fn cp(value: i32) -> Self {
        Self {
            kind: ScoreKind::Centipawns,
            value,
            ..Self::default()
        }
    }

    pub fn mate(value: i32) -> Self {
        Self {
            kind: ScoreKind::Mate,
            value,
            ..Self::default()
        }
    }
}

/// One engine reply to a search request: the chosen move plus the last
/// telemetry line reported before it.
///
/// Missing fields stay zero-valued.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchTelemetry {
    /// The move chosen by the engine (from `bestmove`).
    #[serde(rename = "Move")]
    pub mv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ponder: Option<String>,
    /// Search depth in plies.
    pub depth: u32,
    /// Selective search depth.
    pub sel_depth: u32,
    /// Time spent in milliseconds.
    pub time: u64,
    /// Nodes searched.
    pub nodes: u64,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
    pub multi_pv: u32,
    pub score: Score,
    /// Move currently being searched.
    pub current_move: String,
    pub current_move_number: u32,
    /// Hash table usage (per mille).
    pub hash_full: u32,
    /// Nodes per second.
    pub nps: u64,
    /// Table-base hits.
    pub tb_hits: u64,
    /// Shredder table-base hits.
    #[serde(rename = "Sbhits")]
    pub sb_hits: u64,
    /// CPU usage (per mille).
    pub cpu_load: u32,
    /// Free-form text, the rest of the line after `string`.
    pub string: String,
    pub refutation: Vec<String>,
    pub currline: Vec<String>,
}

/// Which list collects bare tokens while scanning.
#[derive(Clone, Copy)]
enum Accumulator {
    Pv,
    Refutation,
    Currline,
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "multipv"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "sbhits"
            | "cpuload"
            | "currmove"
            | "score"
            | "pv"
            | "refutation"
            | "currline"
            | "string"
    )
}

impl SearchTelemetry {
    /// Parse a telemetry line.
    ///
    /// Tokens are scanned left to right. Unrecognised tokens outside a list
    /// (`pv`, `refutation`, `currline`) are ignored, so the leading `info`
    /// is optional.
    pub fn parse(line: &str) -> Self {
        let mut info = SearchTelemetry::default();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut acc: Option<Accumulator> = None;
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];

            if !is_info_keyword(token) {
                match acc {
                    Some(Accumulator::Pv) => info.pv.push(token.to_string()),
                    Some(Accumulator::Refutation) => info.refutation.push(token.to_string()),
                    Some(Accumulator::Currline) => info.currline.push(token.to_string()),
                    None => {}
                }
                i += 1;
                continue;
            }

            acc = None;
            let next = tokens.get(i + 1).copied();

            match token {
                "pv" => acc = Some(Accumulator::Pv),
                "refutation" => acc = Some(Accumulator::Refutation),
                "currline" => acc = Some(Accumulator::Currline),
                "score" => {
                    let consumed = parse_score(&tokens, i, &mut info.score);
                    i += consumed.max(1);
                    continue;
                }
                "string" => {
                    info.string = rest_of_line(line, token).to_string();
                    break;
                }
                "currmove" => {
                    if let Some(mv) = next {
                        info.current_move = mv.to_string();
                        i += 2;
                        continue;
                    }
                }
                key => {
                    if let Some(value) = next {
                        if set_int(&mut info, key, value) {
                            i += 2;
                            continue;
                        }
                    }
                }
            }
            i += 1;
        }

        info
    }

    /// The engine found no legal move (`bestmove (none)` and friends).
    pub fn is_no_move(&self) -> bool {
        matches!(self.mv.as_str(), "" | "(none)" | "0000")
    }

    /// The engine reports a forced mate on its very next move.
    pub fn is_mate_in_one(&self) -> bool {
        self.score.kind == ScoreKind::Mate && self.score.value == 1
    }
}

/// Store an integer field. Returns false when the value does not parse.
fn set_int(info: &mut SearchTelemetry, key: &str, value: &str) -> bool {
    fn parse<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
        match value.parse() {
            Ok(v) => {
                *slot = v;
                true
            }
            Err(_) => false,
        }
    }

    match key {
        "depth" => parse(value, &mut info.depth),
        "seldepth" => parse(value, &mut info.sel_depth),
        "time" => parse(value, &mut info.time),
        "nodes" => parse(value, &mut info.nodes),
        "multipv" => parse(value, &mut info.multi_pv),
        "currmovenumber" => parse(value, &mut info.current_move_number),
        "hashfull" => parse(value, &mut info.hash_full),
        "nps" => parse(value, &mut info.nps),
        "tbhits" => parse(value, &mut info.tb_hits),
        "sbhits" => parse(value, &mut info.sb_hits),
        "cpuload" => parse(value, &mut info.cpu_load),
        _ => false,
    }
}

/// The verbatim remainder of `line` after the keyword token `key`.
fn rest_of_line<'a>(line: &'a str, key: &'a str) -> &'a str {
    let offset = key.as_ptr() as usize - line.as_ptr() as usize + key.len();
    line[offset..].trim()
}

/// Parse a `score` clause starting at `tokens[start]`.
///
/// Consumes the `score` token, a `cp <n>` or `mate <n>` pair and any
/// `lowerbound` / `upperbound` flags. Returns the number of tokens consumed,
/// counting `score` itself, or 0 when `tokens[start]` is not `score`.
pub fn parse_score(tokens: &[&str], start: usize, target: &mut Score) -> usize {
    if tokens.get(start) != Some(&"score") {
        return 0;
    }

    let mut i = start + 1;
    while i < tokens.len() {
        match tokens[i] {
            kind @ ("cp" | "mate") => {
                let value = tokens.get(i + 1).and_then(|v| v.parse::<i32>().ok());
                match value {
                    Some(value) => {
                        target.kind = if kind == "cp" {
                            ScoreKind::Centipawns
                        } else {
                            ScoreKind::Mate
                        };
                        target.value = value;
                        i += 2;
                    }
                    None => break,
                }
            }
            "lowerbound" => {
                target.lowerbound = true;
                i += 1;
            }
            "upperbound" => {
                target.upperbound = true;
                i += 1;
            }
            _ => break,
        }
    }

    i - start
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn score_of(input: &str) -> (Score, usize) {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let mut score = Score::default();
        let consumed = parse_score(&tokens, 0, &mut score);
        (score, consumed)
    }

    #[test]
    fn score_cp() {
        assert_eq!(score_of("score cp 100"), (Score::cp(100), 3));
        assert_eq!(score_of("score cp -100"), (Score::cp(-100), 3));
    }

    #[test]
    fn score_bounds_consume_one_token() {
        let (score, consumed) = score_of("score cp 100 upperbound");
        assert_eq!(consumed, 4);
        assert!(score.upperbound);
        assert!(!score.lowerbound);

        let (score, consumed) = score_of("score mate -3 lowerbound");
        assert_eq!(consumed, 4);
        assert_eq!(score.kind, ScoreKind::Mate);
        assert_eq!(score.value, -3);
        assert!(score.lowerbound);
    }

    #[test]
    fn score_stops_at_unknown_token() {
        assert_eq!(score_of("score cp 100 suffix").1, 3);
        assert_eq!(score_of("score cp 100 lowerbound suffix").1, 4);
    }

    #[test]
    fn score_requires_score_keyword() {
        assert_eq!(score_of("cp 100").1, 0);
    }

    #[test]
    fn parse_depth_seldepth_multipv_and_bound() {
        let info = SearchTelemetry::parse("info depth 1 seldepth 2 multipv 3 score cp 100 lowerbound");

        assert_eq!(info.depth, 1);
        assert_eq!(info.sel_depth, 2);
        assert_eq!(info.multi_pv, 3);
        assert_eq!(
            info.score,
            Score {
                kind: ScoreKind::Centipawns,
                value: 100,
                lowerbound: true,
                upperbound: false,
            }
        );
    }

    #[test]
    fn parse_full_line() {
        let line = "info depth 12 seldepth 18 time 420 nodes 125000 nps 500000 hashfull 37 tbhits 2 cpuload 990 score cp 30 pv e2e4 e7e5 g1f3";
        let info = SearchTelemetry::parse(line);

        assert_eq!(info.depth, 12);
        assert_eq!(info.sel_depth, 18);
        assert_eq!(info.time, 420);
        assert_eq!(info.nodes, 125000);
        assert_eq!(info.nps, 500000);
        assert_eq!(info.hash_full, 37);
        assert_eq!(info.tb_hits, 2);
        assert_eq!(info.cpu_load, 990);
        assert_eq!(info.score, Score::cp(30));
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn lists_end_at_next_keyword() {
        let info = SearchTelemetry::parse(
            "info currmove e2e4 currmovenumber 1 pv e2e4 e7e5 refutation d2d4 d7d5 depth 4",
        );

        assert_eq!(info.current_move, "e2e4");
        assert_eq!(info.current_move_number, 1);
        assert_eq!(info.pv, vec!["e2e4", "e7e5"]);
        assert_eq!(info.refutation, vec!["d2d4", "d7d5"]);
        assert_eq!(info.depth, 4);
    }

    #[test]
    fn currline_is_collected() {
        let info = SearchTelemetry::parse("info currline 1 e2e4 e7e5");
        assert_eq!(info.currline, vec!["1", "e2e4", "e7e5"]);
    }

    #[test]
    fn string_takes_rest_verbatim() {
        let info = SearchTelemetry::parse("info depth 5 string NNUE  evaluation enabled depth 3");
        assert_eq!(info.depth, 5);
        assert_eq!(info.string, "NNUE  evaluation enabled depth 3");
    }

    #[test]
    fn leading_info_is_optional() {
        let info = SearchTelemetry::parse("nfo depth 1 seldepth 2 pv e2e4 e7e5");
        assert_eq!(info.depth, 1);
        assert_eq!(info.sel_depth, 2);
        assert_eq!(info.pv, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn non_numeric_value_is_skipped() {
        let info = SearchTelemetry::parse("info depth x nodes 10");
        assert_eq!(info.depth, 0);
        assert_eq!(info.nodes, 10);
    }

    #[test]
    fn empty_line_is_zero_valued() {
        assert_eq!(SearchTelemetry::parse(""), SearchTelemetry::default());
    }

    #[test]
    fn termination_signals() {
        let mut info = SearchTelemetry {
            mv: "(none)".to_string(),
            ..Default::default()
        };
        assert!(info.is_no_move());

        info.mv = "e2e4".to_string();
        assert!(!info.is_no_move());

        info.score = Score::mate(1);
        assert!(info.is_mate_in_one());
        info.score = Score::mate(-1);
        assert!(!info.is_mate_in_one());
    }

    #[test]
    fn serializes_with_report_field_names() {
        let info = SearchTelemetry {
            mv: "e2e4".to_string(),
            depth: 3,
            score: Score::mate(2),
            ..Default::default()
        };
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["Move"], "e2e4");
        assert_eq!(json["Depth"], 3);
        assert_eq!(json["SelDepth"], 0);
        assert_eq!(json["Score"]["Type"], 1);
        assert_eq!(json["Score"]["Value"], 2);
        assert!(json.get("Ponder").is_none());
    }

    proptest! {
        #[test]
        fn parse_never_panics(line in "\\PC{0,80}") {
            let _ = SearchTelemetry::parse(&line);
        }
    }
}
