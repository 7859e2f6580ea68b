//! Persistent event listeners.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, ServiceExt, service_fn};

use shardline_core::{Envelope, ShardId};

/// Type-erased listener handler.
pub type ListenerHandler = BoxCloneSyncService<ListenerEvent, (), BoxError>;

/// The request a listener receives.
#[derive(Clone)]
pub struct ListenerEvent {
    pub envelope: Arc<Envelope>,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl ListenerEvent {
    pub fn shard_id(&self) -> &ShardId {
        &self.envelope.shard_id
    }

    pub fn event(&self) -> &str {
        &self.envelope.event
    }

    pub fn data(&self) -> &Value {
        &self.envelope.data
    }

    /// Deserializes the payload.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.envelope.data)
    }

    /// Returns the context of the listener's module, if it has type `T`.
    pub fn bound<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.context
            .clone()
            .and_then(|ctx| ctx.downcast::<T>().ok())
    }
}

/// A handler invoked for every envelope of one event, on every shard.
#[derive(Clone)]
pub struct Listener {
    event: String,
    handler: ListenerHandler,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// `on_guild_create` and `GUILD_CREATE` both listen to `guild_create`.
fn event_name(name: &str) -> String {
    let name = name.strip_prefix("on_").unwrap_or(name);
    name.to_lowercase()
}

impl Listener {
    pub fn new<F, Fut>(event: &str, f: F) -> Self
    where
        F: Fn(ListenerEvent) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self::from_service(event, BoxCloneSyncService::new(service_fn(f)))
    }

    pub fn from_service(event: &str, handler: ListenerHandler) -> Self {
        Self {
            event: event_name(event),
            handler,
            context: None,
        }
    }

    /// The event this listener fires on.
    pub fn event(&self) -> &str {
        &self.event
    }

    pub(crate) fn bind_context(&mut self, context: Arc<dyn Any + Send + Sync>) {
        self.context.get_or_insert(context);
    }

    /// Runs the handler for one envelope.
    pub async fn call(&self, envelope: Arc<Envelope>) -> Result<(), BoxError> {
        let event = ListenerEvent {
            envelope,
            context: self.context.clone(),
        };
        self.handler.clone().oneshot(event).await
    }
}
