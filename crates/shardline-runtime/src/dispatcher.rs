//! Broker-backed event dispatcher.
//!
//! The dispatcher owns the worker's side of the broker topology:
//!
//! - **Shared subscriptions** are bound to the load-balanced queue
//!   (`*.command` and anything every replica may handle).
//! - **Static subscriptions** are bound to this worker's exclusive queue and
//!   stay until explicitly removed.
//! - **Dynamic subscriptions** exist while at least one [`wait_for`] call
//!   waits on the key. The last waiter to settle unbinds it, unless the key
//!   is also static.
//!
//! Every envelope resolves its waiters synchronously, exact key first, then
//! the wildcard key. Persistent [`Listener`]s for the event are spawned as
//! independent tasks afterwards.
//!
//! [`wait_for`]: EventDispatcher::wait_for

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

use shardline_core::{
    Broker, BrokerResult, Deliveries, Envelope, QueueKind, RoutingKey, ShardId, Topology,
};
use shardline_framework::{BoxError, Listener};

use crate::error::{DispatchResult, WaitError, WaitResult};

type Predicate = Box<dyn Fn(&Envelope) -> Result<bool, BoxError> + Send + Sync>;

struct Waiter {
    id: u64,
    predicate: Predicate,
    tx: oneshot::Sender<WaitResult<Arc<Envelope>>>,
}

#[derive(Default)]
struct Subscriptions {
    shared: BTreeSet<RoutingKey>,
    statics: BTreeSet<RoutingKey>,
    waiters: HashMap<RoutingKey, Vec<Waiter>>,
    /// Exclusive-queue keys the broker currently has bound.
    bound: BTreeSet<RoutingKey>,
    connected: bool,
}

impl Subscriptions {
    fn has_waiters(&self, key: &RoutingKey) -> bool {
        self.waiters.get(key).is_some_and(|w| !w.is_empty())
    }

    fn wants(&self, key: &RoutingKey) -> bool {
        self.statics.contains(key) || self.has_waiters(key)
    }

    fn exclusive_keys(&self) -> BTreeSet<RoutingKey> {
        self.statics
            .iter()
            .chain(self.waiters.keys().filter(|k| self.has_waiters(k)))
            .cloned()
            .collect()
    }

    fn remove_waiter(&mut self, key: &RoutingKey, id: u64) {
        if let Some(waiters) = self.waiters.get_mut(key) {
            waiters.retain(|w| w.id != id);
            if waiters.is_empty() {
                self.waiters.remove(key);
            }
        }
    }
}

/// Routes broker deliveries to waiters and persistent listeners.
pub struct EventDispatcher {
    me: Weak<EventDispatcher>,
    broker: Arc<dyn Broker>,
    topology: Topology,
    reconnect_delay: Duration,
    subs: Mutex<Subscriptions>,
    /// Serializes bind/unbind round trips so broker state follows `subs`.
    binding: AsyncMutex<()>,
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    next_waiter: AtomicU64,
}

impl EventDispatcher {
    pub fn new(broker: Arc<dyn Broker>, topology: Topology, reconnect_delay: Duration) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            broker,
            topology,
            reconnect_delay,
            subs: Mutex::default(),
            binding: AsyncMutex::new(()),
            listeners: RwLock::default(),
            next_waiter: AtomicU64::new(0),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.subs.lock().connected
    }

    /// Number of waiters that have not settled yet.
    pub fn waiter_count(&self) -> usize {
        self.subs.lock().waiters.values().map(Vec::len).sum()
    }

    pub fn has_waiters(&self, key: &RoutingKey) -> bool {
        self.subs.lock().has_waiters(key)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Binds `key` to the shared queue, or statically to the exclusive queue.
    ///
    /// Subscribing twice is a no-op. While disconnected the key is recorded
    /// and bound on the next connect.
    pub async fn subscribe(&self, key: impl Into<RoutingKey>, queue: QueueKind) -> DispatchResult<()> {
        let key = key.into();
        match queue {
            QueueKind::Shared => {
                let _guard = self.binding.lock().await;
                let (added, connected) = {
                    let mut subs = self.subs.lock();
                    (subs.shared.insert(key.clone()), subs.connected)
                };
                if added && connected {
                    self.broker.bind(QueueKind::Shared, &key).await?;
                }
            }
            QueueKind::Exclusive => {
                self.subs.lock().statics.insert(key.clone());
                self.reconcile(&key).await?;
            }
        }
        debug!(routing_key = %key, queue = ?queue, "Subscribed");
        Ok(())
    }

    /// Removes an exclusive-queue subscription.
    ///
    /// Without `force` this does nothing while waiters reference the key and
    /// returns `false`. With `force` the waiters fail with [`WaitError::Closed`].
    pub async fn unsubscribe(&self, key: impl Into<RoutingKey>, force: bool) -> DispatchResult<bool> {
        let key = key.into();
        let dropped = {
            let mut subs = self.subs.lock();
            if subs.has_waiters(&key) && !force {
                return Ok(false);
            }
            subs.statics.remove(&key);
            subs.waiters.remove(&key).unwrap_or_default()
        };
        for waiter in dropped {
            let _ = waiter.tx.send(Err(WaitError::Closed));
        }
        self.reconcile(&key).await?;
        debug!(routing_key = %key, force, "Unsubscribed");
        Ok(true)
    }

    /// Removes a shared-queue subscription.
    pub async fn unsubscribe_shared(&self, key: impl Into<RoutingKey>) -> DispatchResult<()> {
        let key = key.into();
        let _guard = self.binding.lock().await;
        let (removed, connected) = {
            let mut subs = self.subs.lock();
            (subs.shared.remove(&key), subs.connected)
        };
        if removed && connected {
            self.broker.unbind(QueueKind::Shared, &key).await?;
        }
        Ok(())
    }

    /// Brings the broker binding of an exclusive key in line with what
    /// static subscriptions and waiters require.
    async fn reconcile(&self, key: &RoutingKey) -> BrokerResult<()> {
        let _guard = self.binding.lock().await;
        let (wanted, bound, connected) = {
            let subs = self.subs.lock();
            (subs.wants(key), subs.bound.contains(key), subs.connected)
        };
        if !connected {
            return Ok(());
        }
        match (wanted, bound) {
            (true, false) => {
                self.broker.bind(QueueKind::Exclusive, key).await?;
                self.subs.lock().bound.insert(key.clone());
                trace!(routing_key = %key, "Bound exclusive key");
            }
            (false, true) => {
                self.broker.unbind(QueueKind::Exclusive, key).await?;
                self.subs.lock().bound.remove(key);
                trace!(routing_key = %key, "Unbound exclusive key");
            }
            _ => {}
        }
        Ok(())
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Waits for the next `event` on `shard` that satisfies `predicate`.
    ///
    /// Use [`ShardId::wildcard`] to accept any shard. The routing key is
    /// bound for as long as the wait lasts. The wait ends with the envelope,
    /// the predicate's error, or [`WaitError::Timeout`].
    pub async fn wait_for<P>(
        &self,
        event: &str,
        shard: impl Into<ShardId>,
        predicate: P,
        timeout: Option<Duration>,
    ) -> WaitResult<Arc<Envelope>>
    where
        P: Fn(&Envelope) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        let key = RoutingKey::new(&shard.into(), event);
        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.subs
            .lock()
            .waiters
            .entry(key.clone())
            .or_default()
            .push(Waiter {
                id,
                predicate: Box::new(predicate),
                tx,
            });
        let mut pending = PendingWait {
            dispatcher: self,
            key,
            id,
            settled: false,
        };

        if let Err(e) = self.reconcile(&pending.key).await {
            if !e.is_connection_error() {
                pending.settle().await;
                return Err(e.into());
            }
            warn!(routing_key = %pending.key, error = %e, "Waiting without binding until reconnect");
        }

        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| WaitError::Timeout(limit)),
            None => Ok(rx.await),
        };
        pending.settle().await;

        match received {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WaitError::Closed),
            Err(e) => Err(e),
        }
    }

    /// Resolves the waiters on one key. Returns how many settled.
    fn resolve_waiters(&self, envelope: &Arc<Envelope>, key: &RoutingKey) -> usize {
        let mut subs = self.subs.lock();
        let Some(waiters) = subs.waiters.get_mut(key) else {
            return 0;
        };

        let mut settled = 0;
        for waiter in std::mem::take(waiters) {
            if waiter.tx.is_closed() {
                continue;
            }
            let outcome = match (waiter.predicate)(envelope) {
                Ok(true) => Ok(envelope.clone()),
                Ok(false) => {
                    waiters.push(waiter);
                    continue;
                }
                Err(e) => Err(WaitError::Predicate(e)),
            };
            let _ = waiter.tx.send(outcome);
            settled += 1;
        }
        if waiters.is_empty() {
            subs.waiters.remove(key);
        }
        settled
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Registers a persistent listener for its event on every shard.
    pub fn register_listener(&self, listener: Listener) {
        debug!(event = listener.event(), "Registered listener");
        self.listeners
            .write()
            .entry(listener.event().to_string())
            .or_default()
            .push(listener);
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Dispatches one envelope: waiters first, then listeners.
    pub fn on_envelope(&self, envelope: Envelope) {
        let envelope = Arc::new(envelope);
        let exact = envelope.routing_key();
        let span = debug_span!("dispatch", routing_key = %exact);
        let _enter = span.enter();

        let wildcard = envelope.wildcard_key();
        let mut settled = self.resolve_waiters(&envelope, &exact);
        if wildcard != exact {
            settled += self.resolve_waiters(&envelope, &wildcard);
        }
        if settled > 0 {
            debug!(settled, "Resolved waiters");
        }

        let listeners = self
            .listeners
            .read()
            .get(&envelope.event)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            let envelope = envelope.clone();
            tokio::spawn(
                async move {
                    if let Err(e) = listener.call(envelope).await {
                        error!(event = listener.event(), error = %e, "Listener failed");
                    }
                }
                .instrument(span.clone()),
            );
        }
    }

    /// Dispatches a locally produced event on the wildcard shard.
    pub fn emit(&self, event: &str, data: Value) {
        self.on_envelope(Envelope::new(ShardId::wildcard(), event, data));
    }

    fn on_delivery(&self, body: &[u8]) {
        match Envelope::decode_msgpack(body) {
            Ok(envelope) => self.on_envelope(envelope),
            Err(e) => warn!(error = %e, len = body.len(), "Dropping undecodable delivery"),
        }
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Connects and restores every subscription.
    async fn connect(&self) -> DispatchResult<Deliveries> {
        let deliveries = self.broker.connect(&self.topology).await?;

        let _guard = self.binding.lock().await;
        let (shared, exclusive) = {
            let mut subs = self.subs.lock();
            subs.bound.clear();
            (subs.shared.clone(), subs.exclusive_keys())
        };
        for key in &shared {
            self.broker.bind(QueueKind::Shared, key).await?;
        }
        for key in &exclusive {
            self.broker.bind(QueueKind::Exclusive, key).await?;
        }

        let restored = exclusive.len();
        {
            let mut subs = self.subs.lock();
            subs.bound = exclusive;
            subs.connected = true;
        }
        debug!(shared = shared.len(), exclusive = restored, "Subscriptions restored");
        Ok(deliveries)
    }

    fn mark_disconnected(&self) {
        let mut subs = self.subs.lock();
        subs.connected = false;
        subs.bound.clear();
    }

    /// Consumes deliveries until `cancel` fires.
    ///
    /// A failed connect or a lost connection is retried after the fixed
    /// reconnect delay, forever.
    pub async fn run(&self, cancel: CancellationToken) {
        let delay_ms = self.reconnect_delay.as_millis() as u64;
        while !cancel.is_cancelled() {
            match self.connect().await {
                Ok(mut deliveries) => {
                    info!(
                        exchange = %self.topology.exchange,
                        shared_queue = %self.topology.shared_queue,
                        "Connected to broker"
                    );
                    loop {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                self.mark_disconnected();
                                return;
                            }
                            body = deliveries.recv() => match body {
                                Some(body) => self.on_delivery(&body),
                                None => break,
                            },
                        }
                    }
                    self.mark_disconnected();
                    warn!(delay_ms, "Broker connection lost, reconnecting");
                }
                Err(e) => {
                    self.mark_disconnected();
                    error!(error = %e, delay_ms, "Failed to connect to broker, retrying");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = sleep(self.reconnect_delay) => {}
            }
        }
    }
}

/// Removes a waiter when its wait ends, however it ends.
struct PendingWait<'a> {
    dispatcher: &'a EventDispatcher,
    key: RoutingKey,
    id: u64,
    settled: bool,
}

impl PendingWait<'_> {
    async fn settle(&mut self) {
        self.settled = true;
        self.dispatcher.subs.lock().remove_waiter(&self.key, self.id);
        if let Err(e) = self.dispatcher.reconcile(&self.key).await {
            warn!(routing_key = %self.key, error = %e, "Failed to release dynamic subscription");
        }
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // The waiting future was dropped mid-wait.
        self.dispatcher.subs.lock().remove_waiter(&self.key, self.id);
        if let (Some(dispatcher), Ok(handle)) = (self.dispatcher.me.upgrade(), Handle::try_current()) {
            let key = self.key.clone();
            handle.spawn(async move {
                if let Err(e) = dispatcher.reconcile(&key).await {
                    warn!(routing_key = %key, error = %e, "Failed to release dynamic subscription");
                }
            });
        }
    }
}
