//! Unified error types for the Shardline core interfaces.
//!
//! Each external collaborator (shared store, broker, entity lookup, outbound
//! sender) has its own error enum. Higher layers wrap these with `#[from]`.

use thiserror::Error;

// =============================================================================
// Store Errors
// =============================================================================

/// Errors returned by a [`SharedStore`](crate::SharedStore) implementation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A value exists but has an unexpected shape.
    #[error("value at '{key}' is not a valid {expected}")]
    WrongType {
        /// The offending key.
        key: String,
        /// What the caller expected to find.
        expected: &'static str,
    },

    /// Any other backend failure.
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Creates a wrong-type error for `key`.
    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }
}

// =============================================================================
// Broker Errors
// =============================================================================

/// Errors that can occur in broker operations.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Connecting to the broker failed.
    #[error("broker connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The broker URL.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The connection was closed underneath an operation.
    #[error("broker connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// A bind or unbind was rejected.
    #[error("failed to {action} routing key '{key}': {reason}")]
    Binding {
        /// `bind` or `unbind`.
        action: &'static str,
        /// The routing key.
        key: String,
        /// Reason for failure.
        reason: String,
    },
}

impl BrokerError {
    /// Returns `true` if the error means the connection is gone and the
    /// consumer loop should reconnect.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionClosed { .. }
        )
    }
}

// =============================================================================
// Envelope Errors
// =============================================================================

/// Errors raised while decoding or encoding an [`Envelope`](crate::Envelope).
#[derive(Debug, Clone, Error)]
pub enum EnvelopeError {
    /// MessagePack decoding failed.
    #[error("invalid msgpack envelope: {0}")]
    Msgpack(String),

    /// JSON decoding failed.
    #[error("invalid json envelope: {0}")]
    Json(String),

    /// Encoding failed.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

impl From<rmp_serde::decode::Error> for EnvelopeError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Msgpack(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for EnvelopeError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<serde_json::Error> for EnvelopeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// =============================================================================
// Lookup Errors
// =============================================================================

/// Errors returned by an [`EntityLookup`](crate::EntityLookup).
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The entity does not exist (neither cached nor upstream).
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"channel"`.
        kind: &'static str,
        /// Entity id.
        id: u64,
    },

    /// A cached record could not be decoded.
    #[error("failed to decode cached {kind}: {reason}")]
    Decode {
        /// Entity kind.
        kind: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Upstream API failure other than not-found.
    #[error("upstream lookup failed: {0}")]
    Upstream(String),
}

impl LookupError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: u64) -> Self {
        Self::NotFound { kind, id }
    }

    /// Returns `true` for [`LookupError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// =============================================================================
// Outbound Errors
// =============================================================================

/// Errors returned by an [`Outbound`](crate::Outbound) sender.
#[derive(Debug, Clone, Error)]
pub enum OutboundError {
    /// The bot may not post to the target.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The target does not exist.
    #[error("target not found: {0}")]
    NotFound(String),

    /// Any other failure.
    #[error("send failed: {0}")]
    Failed(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result type for envelope codec operations.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Result type for entity lookups.
pub type LookupResult<T> = Result<T, LookupError>;

/// Result type for outbound sends.
pub type OutboundResult<T> = Result<T, OutboundError>;
