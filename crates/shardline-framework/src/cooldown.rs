//! Distributed command cooldowns.
//!
//! A cooldown allows `rate` uses per `per` window in one scope. The counter
//! lives in the shared store under `cooldown:{command}:{scope}` so every
//! replica sees the same window:
//!
//! 1. counter below `rate`: increment it; the first use opens the window
//!    and later uses keep its expiry;
//! 2. counter at `rate`: fail with the remaining time, and mark the author
//!    as warned (`{key}:{author}:warned`) so only the first refusal in a
//!    window is surfaced.
//!
//! The counter is read and then written in two round trips. Concurrent uses
//! in the same scope can both read the old value and both pass.

use std::fmt;
use std::time::Duration;

use shardline_core::{KeyTtl, StoreResult};
use tracing::trace;

use crate::command::CommandNode;
use crate::context::CommandContext;
use crate::error::{CheckFailure, CommandResult};

/// The dimension a cooldown counter is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CooldownScope {
    /// One counter for everyone.
    Global,
    /// Per guild; direct messages fall back to the channel.
    Guild,
    Channel,
    #[default]
    Author,
}

impl fmt::Display for CooldownScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Author => "author",
        })
    }
}

/// A `rate` per `per` limit on one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    rate: u64,
    per: Duration,
    scope: CooldownScope,
}

impl Cooldown {
    pub fn new(rate: u64, per: Duration, scope: CooldownScope) -> Self {
        Self { rate, per, scope }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn per(&self) -> Duration {
        self.per
    }

    pub fn scope(&self) -> CooldownScope {
        self.scope
    }

    fn scope_value(&self, ctx: &CommandContext) -> String {
        match self.scope {
            CooldownScope::Global => "*".to_string(),
            CooldownScope::Guild => ctx.guild_id().unwrap_or(ctx.channel_id()).to_string(),
            CooldownScope::Channel => ctx.channel_id().to_string(),
            CooldownScope::Author => ctx.author().id.to_string(),
        }
    }

    /// Store key of the counter for this invocation.
    pub fn key(&self, ctx: &CommandContext, command: &CommandNode) -> String {
        format!(
            "cooldown:{}:{}",
            command.full_name().replace(' ', ""),
            self.scope_value(ctx)
        )
    }

    /// Counts one use, or fails if the window is used up.
    pub async fn check(&self, ctx: &CommandContext, command: &CommandNode) -> CommandResult<()> {
        let store = ctx.store();
        let key = self.key(ctx, command);
        let current = store.get_counter(&key).await?;

        if current >= self.rate {
            let remaining = store.ttl(&key).await?.remaining().unwrap_or_default();
            let warned_key = format!("{key}:{}:warned", ctx.author().id);
            let warned = store.exists(&warned_key).await?;
            if !warned {
                store.set_ex(&warned_key, "1", self.per).await?;
            }
            return Err(CheckFailure::CommandOnCooldown {
                rate: self.rate,
                per: self.per,
                scope: self.scope,
                remaining,
                warned,
            }
            .into());
        }

        let ttl = match store.ttl(&key).await? {
            KeyTtl::Expires(remaining) if current > 0 && !remaining.is_zero() => remaining,
            _ => self.per,
        };
        store.set_ex(&key, &(current + 1).to_string(), ttl).await?;
        trace!(key = %key, uses = current + 1, "cooldown counted");
        Ok(())
    }

    /// Clears the counter for this invocation's scope.
    pub async fn reset(&self, ctx: &CommandContext, command: &CommandNode) -> StoreResult<()> {
        ctx.store().delete(&self.key(ctx, command)).await?;
        Ok(())
    }
}
