//! Pluggable decoding of inbound frames.

use crate::ComError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

/// Maps the `key` discriminator of inbound frames to concrete messages.
pub trait Flow: Send + Sync + 'static {
    type Message: Send + 'static;

    /// Decode `frame`, whose envelope carried `key`.
    fn decode(&self, key: &str, frame: &str) -> Result<Self::Message, ComError>;
}

#[derive(Deserialize)]
struct Envelope {
    key: String,
}

/// Extract the envelope key of `frame` and hand it to `flow`.
pub fn decode_frame<F: Flow>(flow: &F, frame: &str) -> Result<F::Message, ComError> {
    let envelope: Envelope = serde_json::from_str(frame).map_err(ComError::Malformed)?;
    flow.decode(&envelope.key, frame)
}

type DecodeFn<M> = Box<dyn Fn(&str) -> Result<M, serde_json::Error> + Send + Sync>;

/// Registry of decoders keyed by discriminator.
pub struct Decoders<M> {
    table: HashMap<&'static str, DecodeFn<M>>,
}

impl<M: 'static> Decoders<M> {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Decode frames tagged `key` as `T`, then wrap them into the flow's message type.
    pub fn register<T>(mut self, key: &'static str, wrap: fn(T) -> M) -> Self
    where
        T: DeserializeOwned + 'static,
    {
        self.table.insert(
            key,
            Box::new(move |frame| serde_json::from_str::<T>(frame).map(wrap)),
        );
        self
    }

    pub fn decode(&self, key: &str, frame: &str) -> Result<M, ComError> {
        let decoder = self
            .table
            .get(key)
            .ok_or_else(|| ComError::UnknownKey(key.to_string()))?;
        decoder(frame).map_err(|source| ComError::Decode {
            key: key.to_string(),
            source,
        })
    }
}

impl<M: 'static> Default for Decoders<M> {
    fn default() -> Self {
        Self::new()
    }
}
