//! # Shardline Framework
//!
//! Text commands and event listeners for Shardline workers.
//!
//! This layer provides:
//! - The command tree: [`Command`] builders, resolution, parameter binding and converters
//! - Ordered [`Check`]s, including distributed [`Cooldown`]s
//! - The [`Executor`] that runs command lines and reports failures
//! - The [`ErrorClassifier`] and [`AbuseGuard`] that decide what callers see
//! - [`Listener`]s, [`Task`]s and [`Module`]s that bundle them
//!
//! Everything here talks to the outside world only through the
//! `shardline-core` interfaces carried by [`Services`].

pub mod abuse;
pub mod check;
pub mod classifier;
pub mod command;
pub mod context;
pub mod cooldown;
pub mod error;
pub mod executor;
pub mod listener;
pub mod module;

#[cfg(test)]
mod testing;

pub use abuse::{AbuseGuard, Escalation};
pub use check::{Check, MAINTENANCE_KEY};
pub use classifier::{ErrorClassifier, Outcome};
pub use command::{
    Arg, BoundArgs, Command, CommandHandler, CommandNode, CommandTable, Converter,
    DeferredConverter, Invocation, ParamKind, Parameter, Resolved,
};
pub use context::{CommandContext, Services};
pub use cooldown::{Cooldown, CooldownScope};
pub use error::{CheckFailure, CommandError, CommandResult};
pub use executor::Executor;
pub use listener::{Listener, ListenerEvent, ListenerHandler};
pub use module::{Module, Task, TaskRun, TaskSchedule};
pub use tower::BoxError;
