//! Communication with the game and test servers.
//!
//! A [`Client`] owns one WebSocket connection and three queues: outbound
//! [`Command`]s, inbound messages decoded by a [`Flow`], and errors. Each use
//! case brings its own flow with a closed set of message kinds:
//!
//! - [`play_flow`] - interactive games against the game server
//! - [`test_flow`] - batch engine-vs-engine testing for the test server

pub mod client;
pub mod flow;
pub mod play_flow;
pub mod test_flow;

pub use client::{Client, Event};
pub use flow::{decode_frame, Decoders, Flow};

use serde::Serialize;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the client and the flows.
///
/// Everything except [`ComError::Connect`] is reported on the client's error
/// queue and leaves the connection open.
#[derive(Error, Debug)]
pub enum ComError {
    /// The initial connection could not be established.
    #[error("Failed to connect: {0}")]
    Connect(#[source] tungstenite::Error),
    /// Reading or writing a frame failed.
    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    /// A frame was not a JSON object with a string `key`.
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The flow has no decoder for this key.
    #[error("Unknown message key: {0}")]
    UnknownKey(String),
    /// The key is known but the body does not match its schema.
    #[error("Failed to decode '{key}' message: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A command could not be serialized.
    #[error("Failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
    /// The connection has been closed.
    #[error("Connection closed")]
    Closed,
}

/// An outbound message.
pub trait Command: Send + 'static {
    /// Encode the command into a wire frame.
    fn encode(&self) -> Result<String, ComError>;
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String, ComError> {
    serde_json::to_string(value).map_err(ComError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            ComError::UnknownKey("bogus".to_string()).to_string(),
            "Unknown message key: bogus"
        );
        assert_eq!(ComError::Closed.to_string(), "Connection closed");
    }

    #[test]
    fn decode_error_names_key() {
        let source = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = ComError::Decode {
            key: "start".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Failed to decode 'start' message"));
    }
}
