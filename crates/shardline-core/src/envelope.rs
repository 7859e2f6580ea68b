//! Broker envelope and routing-key model.
//!
//! Every delivery from the gateway is one [`Envelope`]: a shard id, an event
//! name and an opaque payload. Envelopes are routed on the `events` exchange
//! with the topic key `"{shard_id}.{event}"`, where a shard id of `*` matches
//! every shard.
//!
//! # Example
//!
//! ```rust,ignore
//! let envelope = Envelope::decode_msgpack(&body)?;
//! assert_eq!(envelope.routing_key().as_str(), "3.message_create");
//! assert_eq!(envelope.wildcard_key().as_str(), "*.message_create");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeResult;

/// Shard component of a routing key.
///
/// Gateways send numeric shard ids; the wildcard `*` and any custom
/// string keys are carried as [`ShardId::Key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShardId {
    /// A numeric shard.
    Id(u64),
    /// A string key, including the wildcard `*`.
    Key(String),
}

impl ShardId {
    /// The wildcard shard key.
    pub const WILDCARD: &'static str = "*";

    /// Returns the wildcard shard id.
    pub fn wildcard() -> Self {
        Self::Key(Self::WILDCARD.to_string())
    }

    /// Returns `true` if this id matches every shard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Key(k) if k == Self::WILDCARD)
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::wildcard()
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

impl From<u64> for ShardId {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for ShardId {
    fn from(key: &str) -> Self {
        match key.parse::<u64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Key(key.to_string()),
        }
    }
}

/// A topic routing key of the form `"{shard}.{event}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Builds the key for `event` on `shard`. Event names are lower-cased.
    pub fn new(shard: &ShardId, event: &str) -> Self {
        Self(format!("{shard}.{}", event.to_lowercase()))
    }

    /// Builds the all-shards key for `event`.
    pub fn wildcard(event: &str) -> Self {
        Self::new(&ShardId::wildcard(), event)
    }

    /// Wraps an already formatted key (e.g. `"*.guild_create"`).
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the shard component, or `None` for a key without one.
    pub fn shard(&self) -> Option<&str> {
        self.0.split_once('.').map(|(shard, _)| shard)
    }

    /// Returns the event component.
    pub fn event(&self) -> &str {
        self.0.split_once('.').map_or(&self.0, |(_, event)| event)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoutingKey {
    fn from(key: &str) -> Self {
        Self::raw(key)
    }
}

/// One broker delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Shard the event originated from.
    pub shard_id: ShardId,
    /// Lower-cased event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Creates an envelope, normalising the event name.
    pub fn new(shard_id: impl Into<ShardId>, event: &str, data: Value) -> Self {
        Self {
            shard_id: shard_id.into(),
            event: event.to_lowercase(),
            data,
        }
    }

    /// Decodes a MessagePack body as produced by the gateway.
    pub fn decode_msgpack(body: &[u8]) -> EnvelopeResult<Self> {
        let envelope: Self = rmp_serde::from_slice(body)?;
        Ok(envelope.normalized())
    }

    /// Decodes a JSON body.
    pub fn decode_json(body: &[u8]) -> EnvelopeResult<Self> {
        let envelope: Self = serde_json::from_slice(body)?;
        Ok(envelope.normalized())
    }

    /// Encodes the envelope as a MessagePack map.
    pub fn encode_msgpack(&self) -> EnvelopeResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// The exact routing key `"{shard}.{event}"`.
    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey::new(&self.shard_id, &self.event)
    }

    /// The wildcard routing key `"*.{event}"`.
    pub fn wildcard_key(&self) -> RoutingKey {
        RoutingKey::wildcard(&self.event)
    }

    fn normalized(mut self) -> Self {
        self.event.make_ascii_lowercase();
        self
    }
}
