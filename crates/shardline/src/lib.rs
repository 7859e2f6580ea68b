//! # Shardline
//!
//! Stateless bot workers that consume sharded gateway events from a message
//! broker.
//!
//! ## Architecture
//!
//! ```text
//! gateway ──▶ broker ──▶ Dispatcher ──▶ Executor ──▶ RestClient ──▶ upstream API
//!                        (waiters,      (checks,     (bucket and
//!                         listeners)     cooldowns)   global leases)
//!                             │              │              │
//!                             └──────── shared store ───────┘
//! ```
//!
//! - **Dispatcher**: Routes broker envelopes to one-shot waiters and listeners
//! - **Executor**: Resolves command lines, binds arguments, runs checks
//! - **RestClient**: Serializes upstream calls through leases in the shared store
//! - **Shared store**: Cooldowns, rate-limit leases, error counters, blacklists
//!
//! Every replica is interchangeable; cross-process state lives only in the
//! shared store.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shardline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!
//!     let ping = Command::new("ping").handler(|inv: Invocation| async move {
//!         inv.reply("pong").await?;
//!         Ok(())
//!     });
//!
//!     Worker::builder(config)
//!         .broker(broker)
//!         .store(store)
//!         .command(ping)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `http-client`: reqwest-backed HTTP transport
//! - `amqp-broker`: RabbitMQ broker through lapin

pub use shardline_core as core;
pub use shardline_framework as framework;
pub use shardline_runtime as runtime;
pub use shardline_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use shardline::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use shardline_runtime::config::{ConfigLoader, WorkerConfig, load_config};
    pub use shardline_runtime::logging::init_from_config;
    pub use shardline_runtime::{EventDispatcher, Worker, WorkerBuilder};

    // Commands
    pub use shardline_framework::{
        Check, Command, CommandContext, CommandError, Converter, Cooldown, CooldownScope,
        Invocation, Parameter,
    };

    // Listeners, tasks, modules
    pub use shardline_framework::{BoxError, Listener, ListenerEvent, Module, Task, TaskSchedule};

    // Core model and collaborator interfaces
    pub use shardline_core::{
        Broker, Envelope, MemoryBroker, MemoryStore, Permissions, QueueKind, RoutingKey,
        SharedStore, ShardId,
    };

    // Outbound REST
    pub use shardline_transport::RestClient;

    // Logging macros
    pub use shardline_runtime::prelude::*;
}
