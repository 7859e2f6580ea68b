//! Shared fast store interface.
//!
//! All cross-replica state (cooldown counters, rate-limit leases, abuse
//! counters, blacklists, the entity cache) lives behind [`SharedStore`].
//! Every operation is a single round trip; callers never rely on
//! multi-key transactions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Returns the remaining time for an expiring key.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expires(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns `true` if the key exists.
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Primitive operations required from the shared store.
///
/// Values are UTF-8 strings; structured records are stored as JSON.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Reads a string key.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a string key without expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Writes a string key that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Reads the remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Deletes a key of any type. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Adds `member` to the set at `key`. Returns `true` if it was new.
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Removes `member` from the set at `key`. Returns `true` if it was present.
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Tests set membership.
    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Reads a hash field.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Writes a hash field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Reads an integer counter, treating a missing key as zero.
    async fn get_counter(&self, key: &str) -> StoreResult<u64> {
        match self.get(key).await? {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| StoreError::wrong_type(key, "counter")),
        }
    }

    /// Returns `true` if the string key exists.
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Shared handle to a store implementation.
pub type StoreRef = Arc<dyn SharedStore>;
