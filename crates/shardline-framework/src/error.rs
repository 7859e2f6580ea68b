//! Error types for command execution.

use std::time::Duration;

use thiserror::Error;
use tower::BoxError;

use shardline_core::{LookupError, StoreError};

use crate::cooldown::CooldownScope;

/// A check that refused to let a command run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckFailure {
    #[error("missing permissions: {}", .0.join(", "))]
    MissingPermissions(Vec<String>),

    #[error("bot is missing permissions: {}", .0.join(", "))]
    BotMissingPermissions(Vec<String>),

    #[error("not the server owner")]
    NotOwner,

    #[error("not a bot owner")]
    NotBotOwner,

    #[error("not a guild channel")]
    NotAGuildChannel,

    #[error("not a direct message channel")]
    NotADMChannel,

    /// The cooldown window for this scope is used up.
    #[error("command on cooldown, retry in {remaining:?}")]
    CommandOnCooldown {
        rate: u64,
        per: Duration,
        scope: CooldownScope,
        /// Time until the window closes.
        remaining: Duration,
        /// The caller has already been told once in this window.
        warned: bool,
    },

    #[error("bot is in maintenance")]
    BotInMaintenance,

    /// A custom check refused without a dedicated variant.
    #[error("{0}")]
    Failed(String),
}

/// Errors raised while resolving, binding or running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command not found")]
    CommandNotFound,

    #[error("missing argument `{parameter}`")]
    NotEnoughArguments { parameter: String },

    #[error("value `{value}` for `{parameter}` is not a valid {type_name}: {reason}")]
    ConverterFailed {
        parameter: String,
        /// User-facing name of the expected type.
        type_name: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Check(#[from] CheckFailure),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("{0}")]
    Handler(BoxError),

    #[error("command cancelled")]
    Cancelled,
}

impl CommandError {
    /// Short name of the error kind, used in unexpected-error summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandNotFound => "CommandNotFound",
            Self::NotEnoughArguments { .. } => "NotEnoughArguments",
            Self::ConverterFailed { .. } => "ConverterFailed",
            Self::Check(_) => "CheckFailed",
            Self::Store(_) => "StoreError",
            Self::Lookup(_) => "LookupError",
            Self::Handler(_) => "HandlerError",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Returns `true` for errors that are never surfaced nor counted.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::CommandNotFound | Self::Cancelled)
    }

    /// Recovers a `CommandError` raised inside a handler.
    ///
    /// Handlers return `BoxError`; a boxed `CommandError` or `CheckFailure`
    /// keeps its kind, anything else becomes [`CommandError::Handler`].
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<CommandError>() {
            Ok(e) => *e,
            Err(err) => match err.downcast::<CheckFailure>() {
                Ok(f) => Self::Check(*f),
                Err(err) => Self::Handler(err),
            },
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;
