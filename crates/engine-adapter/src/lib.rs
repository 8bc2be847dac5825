//! Drives UCI engine processes on behalf of a remote server.
//!
//! Two modes share the same building blocks:
//!
//! - **Play** ([`driver`]): one engine plays one game on the game server,
//!   answering move requests under a clock.
//! - **Test** ([`test_runner`]): the test server hands out batches of
//!   engine-vs-engine games, which the [`dispatcher`] runs concurrently
//!   within the host's CPU and memory budget before reporting back.
//!
//! Engines are reached through a [`channel::ProcessChannel`] and spoken to
//! by an [`session::EngineSession`].

pub mod channel;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod driver;
pub mod game_pair;
pub mod resolver;
pub mod session;
pub mod test_runner;

use engine_com::ComError;
use resolver::ResolveError;
use session::SessionError;
use thiserror::Error;

/// Top-level error of both modes.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Com(#[from] ComError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A dispatcher worker panicked.
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
    /// The server sent something the current state does not allow.
    #[error("Unexpected message from server: {0}")]
    UnexpectedMessage(String),
    /// The server asked for a batch that cannot be run.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),
}
