//! Shardline Runtime - the process side of a Shardline worker.
//!
//! This crate provides:
//! - The broker [`EventDispatcher`] (shared and exclusive subscriptions,
//!   one-shot waiters, persistent listeners, reconnect loop)
//! - The [`Worker`] facade that wires broker, store, REST client and executor
//! - Store-backed entity lookup ([`CachedEntities`])
//! - Configuration loading and logging setup
//!
//! ```ignore
//! use shardline_runtime::{Worker, config::load_config, logging};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let worker = Worker::builder(config)
//!         .broker(broker)
//!         .store(store)
//!         .module(backups::module())
//!         .build()?;
//!
//!     // Runs until Ctrl+C or SIGTERM
//!     worker.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Waiting for events
//!
//! ```ignore
//! let dispatcher = worker.dispatcher();
//! let reaction = dispatcher
//!     .wait_for(
//!         "message_reaction_add",
//!         ctx.shard_id().clone(),
//!         move |env| Ok(env.data["message_id"] == message_id),
//!         Some(Duration::from_secs(60)),
//!     )
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod worker;

// Re-exports
pub use cache::CachedEntities;
pub use config::{ConfigError, ConfigLoader, ConfigResult, WorkerConfig};
pub use dispatcher::EventDispatcher;
pub use error::{
    DispatchError, DispatchResult, RuntimeError, RuntimeResult, WaitError, WaitResult,
};
pub use logging::{LoggingBuilder, SpanEvents};
pub use worker::{Worker, WorkerBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
