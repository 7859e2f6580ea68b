//! Worker orchestration.
//!
//! A [`Worker`] owns one broker connection, one REST client, the command
//! executor and every registered listener and task.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use shardline_runtime::{Worker, config::load_config};
//!
//! let config = load_config()?;
//! let worker = Worker::builder(config)
//!     .broker(broker)
//!     .store(store)
//!     .module(my_module)
//!     .build()?;
//! worker.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shardline_core::{Broker, EntityLookup, MessageInfo, QueueKind, StoreRef, UserInfo};
use shardline_framework::{
    AbuseGuard, Command, CommandContext, CommandTable, Executor, Listener, ListenerEvent, Module,
    Services, Task,
};
use shardline_transport::{HttpTransport, RestClient};

use crate::cache::CachedEntities;
use crate::config::{WorkerConfig, validate_config};
use crate::dispatcher::EventDispatcher;
use crate::error::{RuntimeError, RuntimeResult};

/// A running bot worker.
pub struct Worker {
    config: WorkerConfig,
    rest: Arc<RestClient>,
    services: Services,
    dispatcher: Arc<EventDispatcher>,
    executor: Arc<Executor>,
    tasks: Vec<Task>,
    user: Mutex<Option<UserInfo>>,
    bot_id: Arc<AtomicU64>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Worker {
    pub fn builder(config: WorkerConfig) -> WorkerBuilder {
        WorkerBuilder::new(config)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn rest(&self) -> &Arc<RestClient> {
        &self.rest
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// The bot account, once logged in.
    pub fn user(&self) -> Option<UserInfo> {
        self.user.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Logs in, subscribes, and starts consuming.
    ///
    /// Returns the bot account. Dispatches `load` once everything is wired.
    pub async fn start(&self) -> RuntimeResult<UserInfo> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Worker is already running");
            return self.user().ok_or(RuntimeError::MissingService("bot user"));
        }

        let started = self.launch().await;
        if started.is_err() {
            self.running.store(false, Ordering::Release);
        }
        started
    }

    async fn launch(&self) -> RuntimeResult<UserInfo> {
        let user = self.rest.static_login().await?;
        info!(user_id = user.id, username = %user.username, "Logged in");
        self.bot_id.store(user.id, Ordering::Release);
        *self.user.lock() = Some(user.clone());

        let broker = &self.config.broker;
        for key in broker.shared_keys() {
            self.dispatcher.subscribe(key.as_str(), QueueKind::Shared).await?;
        }
        for key in &broker.static_subscriptions {
            self.dispatcher.subscribe(key.as_str(), QueueKind::Exclusive).await?;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let mut handles = Vec::with_capacity(self.tasks.len() + 1);
        let dispatcher = self.dispatcher.clone();
        let token = cancel.clone();
        handles.push(tokio::spawn(async move { dispatcher.run(token).await }));

        for task in self.tasks.iter().cloned() {
            let token = cancel.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = task.run() => {}
                }
            }));
        }
        debug!(tasks = self.tasks.len(), "Background tasks scheduled");
        *self.handles.lock() = handles;

        self.dispatcher.emit("load", Value::Null);
        info!("Worker started");
        Ok(user)
    }

    /// Stops consuming and cancels every background task.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            warn!("Worker is not running");
            return;
        }

        self.cancel.lock().cancel();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await
                && e.is_panic()
            {
                warn!(error = %e, "Background task panicked");
            }
        }
        info!("Worker stopped");
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Worker is now running. Press Ctrl+C to stop.");
        let signalled = wait_for_shutdown().await;
        self.stop().await;
        signalled
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }
}

/// Turns `command` envelopes into executor runs.
fn command_listener(
    executor: Arc<Executor>,
    services: Services,
    prefix: String,
    bot_id: Arc<AtomicU64>,
) -> Listener {
    Listener::new("command", move |event: ListenerEvent| {
        let executor = executor.clone();
        let services = services.clone();
        let prefix = prefix.clone();
        let bot_id = bot_id.load(Ordering::Acquire);
        async move {
            let message: MessageInfo = event.parse()?;
            let ctx = CommandContext::new(event.shard_id().clone(), message, services, bot_id)
                .with_prefix(prefix);
            executor.process(Arc::new(ctx)).await;
            Ok(())
        }
    })
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// WorkerBuilder
// =============================================================================

/// Collects collaborators and registrations for a [`Worker`].
pub struct WorkerBuilder {
    config: WorkerConfig,
    broker: Option<Arc<dyn Broker>>,
    store: Option<StoreRef>,
    transport: Option<Arc<dyn HttpTransport>>,
    entities: Option<Arc<dyn EntityLookup>>,
    table: Arc<CommandTable>,
    listeners: Vec<Listener>,
    tasks: Vec<Task>,
}

impl WorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            broker: None,
            store: None,
            transport: None,
            entities: None,
            table: Arc::new(CommandTable::new()),
            listeners: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Sets the broker. With the `amqp-broker` feature an AMQP broker for
    /// `broker.url` is used when none is given.
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the HTTP transport. With the `http-client` feature a reqwest
    /// transport is used when none is given.
    pub fn http_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the store-backed entity lookup.
    pub fn entities(mut self, entities: Arc<dyn EntityLookup>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn command(self, command: Command) -> Self {
        self.table.add(command.build());
        self
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Registers every command, listener and task of `module`.
    pub fn module(mut self, module: Module) -> Self {
        debug!(module = module.name(), "Registering module");
        let (commands, listeners, tasks) = module.into_parts();
        for command in commands {
            self.table.add(command);
        }
        self.listeners.extend(listeners);
        self.tasks.extend(tasks);
        self
    }

    fn broker_or_default(&mut self) -> RuntimeResult<Arc<dyn Broker>> {
        if let Some(broker) = self.broker.take() {
            return Ok(broker);
        }
        #[cfg(feature = "amqp-broker")]
        {
            let broker = shardline_transport::AmqpBroker::new(self.config.broker.url.clone());
            Ok(Arc::new(broker))
        }
        #[cfg(not(feature = "amqp-broker"))]
        Err(RuntimeError::MissingService("broker"))
    }

    fn http_transport_or_default(&mut self) -> RuntimeResult<Arc<dyn HttpTransport>> {
        if let Some(transport) = self.transport.take() {
            return Ok(transport);
        }
        #[cfg(feature = "http-client")]
        {
            let transport =
                shardline_transport::ReqwestTransport::new(self.config.http.timeout())?;
            Ok(Arc::new(transport))
        }
        #[cfg(not(feature = "http-client"))]
        Err(RuntimeError::MissingService("HTTP transport"))
    }

    /// Validates the configuration and wires the worker.
    pub fn build(mut self) -> RuntimeResult<Worker> {
        validate_config(&self.config)?;

        let broker = self.broker_or_default()?;
        let store = self
            .store
            .take()
            .ok_or(RuntimeError::MissingService("shared store"))?;
        let transport = self.http_transport_or_default()?;

        let rest = Arc::new(RestClient::new(
            transport,
            store.clone(),
            self.config.http.to_rest_config(),
        ));
        let entities = self
            .entities
            .take()
            .unwrap_or_else(|| Arc::new(CachedEntities::new(store.clone(), rest.clone())));
        let services = Services::new(store.clone(), entities, rest.clone());

        let commands = &self.config.commands;
        let [window_min, window_max] = commands.error_window_secs;
        let [blacklist_min, blacklist_max] = commands.blacklist_secs;
        let abuse = AbuseGuard::new(store)
            .with_threshold(commands.error_threshold)
            .with_window(window_min..=window_max)
            .with_blacklist(blacklist_min..=blacklist_max);
        let executor =
            Arc::new(Executor::new(self.table, abuse).with_prefix(commands.prefix.clone()));

        let dispatcher = EventDispatcher::new(
            broker,
            self.config.broker.topology(),
            self.config.broker.reconnect_delay(),
        );
        let bot_id = Arc::new(AtomicU64::new(0));
        dispatcher.register_listener(command_listener(
            executor.clone(),
            services.clone(),
            commands.prefix.clone(),
            bot_id.clone(),
        ));
        for listener in self.listeners {
            dispatcher.register_listener(listener);
        }

        info!(
            commands = executor.table().len(),
            tasks = self.tasks.len(),
            exchange = %self.config.broker.exchange,
            "Worker built"
        );

        Ok(Worker {
            config: self.config,
            rest,
            services,
            dispatcher,
            executor,
            tasks: self.tasks,
            user: Mutex::new(None),
            bot_id,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            handles: Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use shardline_core::{Envelope, MemoryBroker, MemoryStore, SharedStore};
    use shardline_framework::{Invocation, TaskSchedule};
    use shardline_transport::{HttpError, HttpRequest, HttpResponse, HttpResult};
    use tokio::time::sleep;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const BOT_ID: u64 = 99;

    /// Answers login and records every message sent.
    #[derive(Default)]
    struct FakeApi {
        requests: Mutex<Vec<HttpRequest>>,
        reject_login: bool,
    }

    impl FakeApi {
        fn sent(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .filter(|r| r.url.ends_with("/messages"))
                .filter_map(|r| r.body.as_deref())
                .filter_map(|b| serde_json::from_slice::<Value>(b).ok())
                .filter_map(|v| v["content"].as_str().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeApi {
        async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
            let login = request.url.ends_with("/users/@me");
            self.requests.lock().push(request);
            Ok(match (login, self.reject_login) {
                (true, true) => HttpResponse::json(401, &json!({"code": 0, "message": "401: Unauthorized"})),
                (true, false) => HttpResponse::json(200, &json!({"id": BOT_ID.to_string(), "username": "shardbot", "bot": true})),
                (false, _) => HttpResponse::json(200, &json!({"id": "1"})),
            })
        }
    }

    struct Fixture {
        broker: Arc<MemoryBroker>,
        store: Arc<MemoryStore>,
        api: Arc<FakeApi>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                broker: Arc::new(MemoryBroker::new()),
                store: Arc::new(MemoryStore::new()),
                api: Arc::new(FakeApi::default()),
            }
        }

        fn builder(&self) -> WorkerBuilder {
            let mut config = WorkerConfig::default();
            config.broker.static_subscriptions = vec!["*.guild_create".into()];
            config.http.token = "secret".into();
            Worker::builder(config)
                .broker(self.broker.clone())
                .store(self.store.clone())
                .http_transport(self.api.clone())
        }

        async fn publish_command(&self, content: &str) {
            let envelope = Envelope::new(
                3u64,
                "command",
                json!({
                    "id": "500",
                    "channel_id": "600",
                    "author": {"id": "10", "username": "user"},
                    "content": content,
                }),
            );
            assert_eq!(self.broker.publish_envelope(&envelope).await.unwrap(), 1);
        }
    }

    fn ping() -> Command {
        Command::new("ping").handler(|inv: Invocation| async move {
            inv.reply("pong").await?;
            Ok(())
        })
    }

    #[test]
    fn test_build_requires_broker_and_store() {
        let config = WorkerConfig::default();
        #[cfg(not(feature = "amqp-broker"))]
        {
            let err = Worker::builder(config.clone()).build().err();
            assert!(matches!(err, Some(RuntimeError::MissingService("broker"))));
        }

        let err = Worker::builder(config)
            .broker(Arc::new(MemoryBroker::new()))
            .build()
            .err();
        assert!(matches!(err, Some(RuntimeError::MissingService("shared store"))));
    }

    #[cfg(feature = "amqp-broker")]
    #[test]
    fn test_build_defaults_to_amqp_broker() {
        let fixture = Fixture::new();
        let worker = Worker::builder(WorkerConfig::default())
            .store(fixture.store.clone())
            .http_transport(fixture.api.clone())
            .build();
        assert!(worker.is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let fixture = Fixture::new();
        let mut config = WorkerConfig::default();
        config.http.max_attempts = 0;
        let err = Worker::builder(config)
            .broker(fixture.broker.clone())
            .store(fixture.store.clone())
            .http_transport(fixture.api.clone())
            .build()
            .err();
        assert!(matches!(err, Some(RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_binds_subscriptions_and_runs_commands() {
        let fixture = Fixture::new();
        let worker = fixture.builder().command(ping()).build().unwrap();

        let user = assert_ok!(worker.start().await);
        assert_eq!(user.id, BOT_ID);
        sleep(Duration::from_millis(20)).await;

        assert!(fixture.broker.is_bound(QueueKind::Shared, "*.command"));
        assert!(fixture.broker.is_bound(QueueKind::Exclusive, "*.guild_create"));

        fixture.publish_command("!ping").await;
        fixture.publish_command("!unknown").await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.api.sent(), vec!["pong"]);

        worker.stop().await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_login_failure_aborts_start() {
        let fixture = Fixture {
            api: Arc::new(FakeApi {
                reject_login: true,
                ..Default::default()
            }),
            ..Fixture::new()
        };
        let worker = fixture.builder().build().unwrap();

        let err = assert_err!(worker.start().await);
        assert!(matches!(err, RuntimeError::Http(HttpError::LoginFailure)));
        assert!(!worker.is_running());
        assert_eq!(fixture.broker.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_module_registration_and_load_event() {
        let fixture = Fixture::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let module = Module::new("stats", Arc::new(()))
            .command(ping())
            .listener(Listener::new("load", move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }));
        let worker = fixture.builder().module(module).build().unwrap();
        assert!(worker.executor().table().find("ping").is_some());

        worker.start().await.unwrap();
        sleep(Duration::from_millis(20)).await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_tasks() {
        let fixture = Fixture::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = Task::new("tick", TaskSchedule::Every(Duration::from_secs(10)), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let worker = fixture.builder().task(task).build().unwrap();

        worker.start().await.unwrap();
        sleep(Duration::from_secs(25)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        worker.stop().await;
        sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blacklisted_author_is_ignored() {
        let fixture = Fixture::new();
        fixture.store.set("blacklist:10", "1").await.unwrap();
        let worker = fixture.builder().command(ping()).build().unwrap();

        worker.start().await.unwrap();
        sleep(Duration::from_millis(20)).await;
        fixture.publish_command("!ping").await;
        sleep(Duration::from_millis(50)).await;
        assert!(fixture.api.sent().is_empty());
        worker.stop().await;
    }

    #[tokio::test]
    async fn test_run_until_stops_after_shutdown_future() {
        let fixture = Fixture::new();
        let worker = fixture.builder().build().unwrap();
        assert_ok!(worker.run_until(sleep(Duration::from_millis(10))).await);
        assert!(!worker.is_running());
        assert!(worker.user().is_some());
    }
}
