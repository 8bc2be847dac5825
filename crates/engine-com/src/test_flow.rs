//! Messages exchanged with the test server during batch runs.

use crate::flow::{Decoders, Flow};
use crate::{encode_json, ComError, Command};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uci::SearchTelemetry;

/// Semantic version of an engine build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Rendering safe for file names and URLs: `v1-2-3`.
    pub fn url_safe(&self) -> String {
        format!("v{}-{}-{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    /// Accepts `1.2.3` with an optional leading `v`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['v', 'V']);
        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid version '{}', expected major.minor.patch", s));
        }
        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| format!("Invalid version component '{}' in '{}'", part, s))
        };
        Ok(Self {
            major: number(parts[0])?,
            minor: number(parts[1])?,
            patch: number(parts[2])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeControl {
    /// `movetime` or `depth`.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct EngineOptions {
    /// Hash table size in MiB.
    #[serde(default)]
    pub hash: u32,
    #[serde(default)]
    pub threads: u32,
}

/// One of the two engines taking part in a test suite.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSpec {
    pub name: String,
    pub version: Version,
    pub time_control: TimeControl,
    #[serde(default)]
    pub options: EngineOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Suite {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub iterations: u64,
    pub engines: Vec<EngineSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registered {
    pub id: String,
}

/// Request to run one batch of games.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Start {
    pub session: String,
    pub suite: Suite,
    pub recommended_batch_size: usize,
}

/// Inbound messages of the test flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestMessage {
    Registered(Registered),
    Start(Start),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cpu {
    #[serde(skip_serializing_if = "is_zero")]
    pub cores: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub threads: usize,
    pub model: String,
    pub vendor: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Gpu {
    pub model: String,
    pub vendor: String,
    /// Video memory in bytes.
    #[serde(skip_serializing_if = "is_zero")]
    pub memory: u64,
}

/// Host description sent on registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hardware {
    pub cpu: Vec<Cpu>,
    /// Always present on the wire, empty when no card was detected.
    pub gpu: Vec<Gpu>,
    /// Total memory in bytes.
    #[serde(skip_serializing_if = "is_zero")]
    pub memory: u64,
    pub model: String,
    pub os: String,
    pub arch: String,
}

fn is_zero<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Send,
    Recv,
}

/// One line exchanged with an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub value: String,
}

/// Telemetry of one game, indexed by engine then ply.
pub type GameHistory = Vec<Vec<SearchTelemetry>>;

/// Engine transcripts of one game, indexed by engine then line.
pub type GameLogs = Vec<Vec<LogEntry>>;

/// Outbound commands of the test flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum TestCommand {
    Register {
        name: String,
        #[serde(rename = "deviceId")]
        device_id: String,
        hardware: Hardware,
    },
    Report {
        session: String,
        moves: Vec<GameHistory>,
        logs: Vec<GameLogs>,
    },
}

impl Command for TestCommand {
    fn encode(&self) -> Result<String, ComError> {
        encode_json(self)
    }
}

pub struct TestFlow {
    decoders: Decoders<TestMessage>,
}

impl TestFlow {
    pub fn new() -> Self {
        let decoders = Decoders::new()
            .register("registered", TestMessage::Registered)
            .register("start", TestMessage::Start);
        Self { decoders }
    }
}

impl Default for TestFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl Flow for TestFlow {
    type Message = TestMessage;

    fn decode(&self, key: &str, frame: &str) -> Result<TestMessage, ComError> {
        self.decoders.decode(key, frame)
    }
}
