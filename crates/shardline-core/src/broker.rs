//! Message broker interface.
//!
//! A worker consumes from two queues on the topic exchange:
//!
//! | Queue | Purpose |
//! |-------|---------|
//! | [`QueueKind::Shared`] | Load-balanced between replicas; carries `*.command` and other shared subscriptions. |
//! | [`QueueKind::Exclusive`] | Private to one worker; carries static listener keys and dynamic wait keys. |
//!
//! [`Broker::connect`] declares both queues and returns one merged stream
//! of raw message bodies. The stream ending means the connection is gone.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::envelope::RoutingKey;
use crate::error::BrokerResult;

/// Which of the worker's queues a binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// The deployment-wide shared queue.
    Shared,
    /// This worker's exclusive queue.
    Exclusive,
}

/// Queue declaration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Name of the topic exchange.
    pub exchange: String,
    /// Name of the shared queue.
    pub shared_queue: String,
    /// Per-message TTL on the shared queue.
    pub shared_message_ttl: Duration,
    /// Maximum backlog of the exclusive queue.
    pub exclusive_max_length: u32,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: "events".to_string(),
            shared_queue: "shardline".to_string(),
            shared_message_ttl: Duration::from_secs(10),
            exclusive_max_length: 1000,
        }
    }
}

/// Stream of raw delivery bodies from both queues.
pub type Deliveries = mpsc::Receiver<Vec<u8>>;

/// A topic-exchange broker connection.
#[async_trait]
pub trait Broker: Send + Sync {
    /// (Re)connects, declares both queues and starts consuming.
    ///
    /// Bindings of a previous exclusive queue do not survive a reconnect.
    async fn connect(&self, topology: &Topology) -> BrokerResult<Deliveries>;

    /// Binds `key` to the given queue.
    async fn bind(&self, queue: QueueKind, key: &RoutingKey) -> BrokerResult<()>;

    /// Removes the binding of `key` from the given queue.
    async fn unbind(&self, queue: QueueKind, key: &RoutingKey) -> BrokerResult<()>;
}
