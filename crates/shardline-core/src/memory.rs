//! In-process implementations of the store and broker interfaces.
//!
//! [`MemoryStore`] honours key expiry using the tokio clock, so tests that
//! pause time see TTLs advance deterministically. [`MemoryBroker`] performs
//! AMQP topic matching against its bindings and can be told to fail the next
//! connection attempts or to drop the current connection.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::broker::{Broker, Deliveries, QueueKind, Topology};
use crate::envelope::{Envelope, RoutingKey};
use crate::error::{BrokerError, BrokerResult, EnvelopeResult, StoreResult};
use crate::store::{KeyTtl, SharedStore};

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug)]
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    strings: HashMap<String, StringEntry>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl StoreState {
    fn live_string(&mut self, key: &str) -> Option<&StringEntry> {
        let now = Instant::now();
        if self.strings.get(key).is_some_and(|e| e.is_expired(now)) {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }
}

/// A TTL-aware in-memory [`SharedStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live string keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.strings.retain(|_, e| !e.is_expired(now));
        state.strings.len()
    }

    /// Returns `true` if no live string keys exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.state.lock().live_string(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.state.lock().strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        trace!(key, ttl_ms = ttl.as_millis() as u64, "memory store set_ex");
        self.state.lock().strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expiry = state.live_string(key).map(|e| e.expires_at);
        let ttl = match expiry {
            Some(Some(at)) => KeyTtl::Expires(at.saturating_duration_since(now)),
            Some(None) => KeyTtl::Persistent,
            None if state.sets.contains_key(key) || state.hashes.contains_key(key) => {
                KeyTtl::Persistent
            }
            None => KeyTtl::Missing,
        };
        Ok(ttl)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let string = state
            .strings
            .remove(key)
            .is_some_and(|e| !e.is_expired(now));
        let set = state.sets.remove(key).is_some();
        let hash = state.hashes.remove(key).is_some();
        Ok(string || set || hash)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.state
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// MemoryBroker
// =============================================================================

/// Returns `true` if an AMQP topic binding `pattern` matches `key`.
///
/// `*` matches exactly one dot-separated word, `#` matches zero or more.
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    fn go(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.split_first(), key.split_first()) {
            (None, None) => true,
            (Some((&"#", rest)), _) => {
                go(rest, key) || (!key.is_empty() && go(pattern, &key[1..]))
            }
            (Some((&"*", rest)), Some((_, key_rest))) => go(rest, key_rest),
            (Some((p, rest)), Some((k, key_rest))) => p == k && go(rest, key_rest),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    go(&pattern, &key)
}

#[derive(Debug, Default)]
struct BrokerState {
    shared: BTreeSet<String>,
    exclusive: BTreeSet<String>,
    sender: Option<mpsc::Sender<Vec<u8>>>,
    topology: Option<Topology>,
    failures_remaining: u32,
    connects: u32,
}

impl BrokerState {
    fn bindings_mut(&mut self, queue: QueueKind) -> &mut BTreeSet<String> {
        match queue {
            QueueKind::Shared => &mut self.shared,
            QueueKind::Exclusive => &mut self.exclusive,
        }
    }
}

/// An in-process topic [`Broker`].
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
}

impl MemoryBroker {
    /// Creates a broker with no bindings and no connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to [`Broker::connect`] fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().failures_remaining = n;
    }

    /// Number of successful connections so far.
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    /// Topology passed to the latest successful connect.
    pub fn topology(&self) -> Option<Topology> {
        self.state.lock().topology.clone()
    }

    /// Returns `true` if `key` is bound to `queue`.
    pub fn is_bound(&self, queue: QueueKind, key: &str) -> bool {
        self.state.lock().bindings_mut(queue).contains(key)
    }

    /// Sorted bindings of `queue`.
    pub fn bindings(&self, queue: QueueKind) -> Vec<String> {
        self.state
            .lock()
            .bindings_mut(queue)
            .iter()
            .cloned()
            .collect()
    }

    /// Drops the current connection; the consumer sees its stream end.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.sender = None;
        state.exclusive.clear();
    }

    /// Publishes a raw body under `routing_key`.
    ///
    /// Each queue with a matching binding receives one copy. Returns the
    /// number of copies delivered.
    pub async fn publish(&self, routing_key: &str, body: Vec<u8>) -> usize {
        let (sender, copies) = {
            let state = self.state.lock();
            let copies = [&state.shared, &state.exclusive]
                .into_iter()
                .filter(|bindings| bindings.iter().any(|p| topic_matches(p, routing_key)))
                .count();
            (state.sender.clone(), copies)
        };

        let Some(sender) = sender else {
            return 0;
        };
        let mut delivered = 0;
        for _ in 0..copies {
            if sender.send(body.clone()).await.is_err() {
                break;
            }
            delivered += 1;
        }
        debug!(routing_key, delivered, "memory broker publish");
        delivered
    }

    /// Encodes and publishes an envelope under its exact routing key.
    pub async fn publish_envelope(&self, envelope: &Envelope) -> EnvelopeResult<usize> {
        let body = envelope.encode_msgpack()?;
        Ok(self
            .publish(envelope.routing_key().as_str(), body)
            .await)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self, topology: &Topology) -> BrokerResult<Deliveries> {
        let mut state = self.state.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(BrokerError::ConnectionFailed {
                url: "memory://".to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(256);
        state.sender = Some(tx);
        state.exclusive.clear();
        state.topology = Some(topology.clone());
        state.connects += 1;
        Ok(rx)
    }

    async fn bind(&self, queue: QueueKind, key: &RoutingKey) -> BrokerResult<()> {
        let mut state = self.state.lock();
        if state.sender.is_none() {
            return Err(BrokerError::ConnectionClosed {
                reason: "not connected".to_string(),
            });
        }
        state.bindings_mut(queue).insert(key.as_str().to_string());
        Ok(())
    }

    async fn unbind(&self, queue: QueueKind, key: &RoutingKey) -> BrokerResult<()> {
        let mut state = self.state.lock();
        if state.sender.is_none() {
            return Err(BrokerError::ConnectionClosed {
                reason: "not connected".to_string(),
            });
        }
        state.bindings_mut(queue).remove(key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_store_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(
            store.ttl("k").await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(10))
        );

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(
            store.ttl("k").await.unwrap(),
            KeyTtl::Expires(Duration::from_secs(6))
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_store_counter_and_sets() {
        let store = MemoryStore::new();
        assert_eq!(store.get_counter("c").await.unwrap(), 0);
        store.set("c", "3").await.unwrap();
        assert_eq!(store.get_counter("c").await.unwrap(), 3);
        assert_eq!(store.ttl("c").await.unwrap(), KeyTtl::Persistent);

        store.set("bad", "x").await.unwrap();
        assert!(store.get_counter("bad").await.is_err());

        assert!(store.sadd("s", "a").await.unwrap());
        assert!(!store.sadd("s", "a").await.unwrap());
        assert!(store.sismember("s", "a").await.unwrap());
        assert!(store.srem("s", "a").await.unwrap());
        assert!(!store.sismember("s", "a").await.unwrap());

        store.hset("h", "f", "1").await.unwrap();
        assert_eq!(store.hget("h", "f").await.unwrap().as_deref(), Some("1"));
        assert!(store.delete("h").await.unwrap());
        assert_eq!(store.hget("h", "f").await.unwrap(), None);
    }

    #[test]
    fn test_topic_matching() {
        assert!(topic_matches("*.message_create", "3.message_create"));
        assert!(topic_matches("3.message_create", "3.message_create"));
        assert!(!topic_matches("4.message_create", "3.message_create"));
        assert!(!topic_matches("*.message_create", "command"));
        assert!(topic_matches("command", "command"));
        assert!(topic_matches("#", "a.b.c"));
        assert!(topic_matches("a.#", "a"));
        assert!(!topic_matches("*", "a.b"));
    }

    #[tokio::test]
    async fn test_broker_routes_to_bound_queues() {
        let broker = MemoryBroker::new();
        let mut rx = broker.connect(&Topology::default()).await.unwrap();

        broker
            .bind(QueueKind::Exclusive, &RoutingKey::wildcard("guild_create"))
            .await
            .unwrap();

        let envelope = Envelope::new(1_u64, "guild_create", json!({"id": 5}));
        assert_eq!(broker.publish_envelope(&envelope).await.unwrap(), 1);
        let body = rx.recv().await.unwrap();
        assert_eq!(Envelope::decode_msgpack(&body).unwrap(), envelope);

        let other = Envelope::new(1_u64, "typing_start", json!(null));
        assert_eq!(broker.publish_envelope(&other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broker_scripted_failures_and_disconnect() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2);
        let topology = Topology::default();

        assert!(broker.connect(&topology).await.is_err());
        assert!(broker.connect(&topology).await.is_err());
        let mut rx = broker.connect(&topology).await.unwrap();
        assert_eq!(broker.connect_count(), 1);

        broker
            .bind(QueueKind::Exclusive, &RoutingKey::raw("*.ready"))
            .await
            .unwrap();
        broker.disconnect();
        assert!(rx.recv().await.is_none());
        assert!(!broker.is_bound(QueueKind::Exclusive, "*.ready"));
    }
}
