//! Command checks.
//!
//! Every command carries an ordered list of [`Check`]s. The executor evaluates
//! them in order and the first failure aborts the invocation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use shardline_core::{ChannelInfo, ChannelKind, LookupResult, Permissions};

use crate::command::CommandNode;
use crate::context::CommandContext;
use crate::cooldown::Cooldown;
use crate::error::{CheckFailure, CommandResult};

/// Store key that puts the bot into maintenance while set.
pub const MAINTENANCE_KEY: &str = "maintenance";

pub type CheckFn = Arc<dyn Fn(Arc<CommandContext>) -> BoxFuture<'static, CommandResult<()>> + Send + Sync>;

/// A precondition of a command.
#[derive(Clone)]
pub enum Check {
    /// The author must hold these guild permissions. Passes outside guilds.
    HasPermissions(Permissions),
    /// The bot must hold these guild permissions. Passes outside guilds.
    BotHasPermissions(Permissions),
    /// The author must own the guild.
    IsOwner,
    /// The author must own the application or be on its team.
    IsBotOwner,
    /// The channel must be a guild text or news channel.
    GuildOnly,
    /// The channel must be a direct message.
    DmOnly,
    /// Fails while the maintenance key is set.
    Maintenance,
    Cooldown(Cooldown),
    Custom { name: &'static str, check: CheckFn },
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasPermissions(p) => f.debug_tuple("HasPermissions").field(p).finish(),
            Self::BotHasPermissions(p) => f.debug_tuple("BotHasPermissions").field(p).finish(),
            Self::IsOwner => f.write_str("IsOwner"),
            Self::IsBotOwner => f.write_str("IsBotOwner"),
            Self::GuildOnly => f.write_str("GuildOnly"),
            Self::DmOnly => f.write_str("DmOnly"),
            Self::Maintenance => f.write_str("Maintenance"),
            Self::Cooldown(c) => f.debug_tuple("Cooldown").field(c).finish(),
            Self::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

/// Looks up the invocation channel, mapping not-found to `None`.
async fn channel_of(ctx: &CommandContext) -> LookupResult<Option<ChannelInfo>> {
    match ctx.fetch_channel().await {
        Ok(channel) => Ok(Some(channel)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Returns the guild to check permissions in, or `None` outside guilds.
async fn permission_guild(ctx: &CommandContext) -> LookupResult<Option<u64>> {
    let channel = channel_of(ctx).await?;
    Ok(match channel {
        None => None,
        Some(c) if c.kind.is_private() => None,
        Some(c) => c.guild_id.or(ctx.guild_id()),
    })
}

fn names(list: Vec<&'static str>) -> Vec<String> {
    list.into_iter().map(str::to_string).collect()
}

impl Check {
    /// Wraps an async predicate.
    ///
    /// ```rust,ignore
    /// let check = Check::custom("premium", |ctx| async move {
    ///     let premium = ctx.store().exists(&format!("premium:{}", ctx.author().id)).await?;
    ///     if premium { Ok(()) } else { Err(CheckFailure::Failed("premium only".into()).into()) }
    /// });
    /// ```
    pub fn custom<F, Fut>(name: &'static str, check: F) -> Self
    where
        F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult<()>> + Send + 'static,
    {
        Self::Custom {
            name,
            check: Arc::new(move |ctx| check(ctx).boxed()),
        }
    }

    /// Builds a permission check from snake_case names; unknown names are
    /// ignored.
    pub fn has_permissions(names: &[&str]) -> Self {
        Self::HasPermissions(permissions_from(names))
    }

    pub fn bot_has_permissions(names: &[&str]) -> Self {
        Self::BotHasPermissions(permissions_from(names))
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, Self::Cooldown(_))
    }

    /// Runs the check for one invocation of `command`.
    pub async fn evaluate(
        &self,
        ctx: &Arc<CommandContext>,
        command: &CommandNode,
    ) -> CommandResult<()> {
        match self {
            Self::HasPermissions(required) => {
                let Some(guild_id) = permission_guild(ctx).await? else {
                    return Ok(());
                };
                let held = ctx
                    .entities()
                    .member_permissions(guild_id, ctx.author().id)
                    .await?;
                let missing = held.missing(*required);
                if !missing.is_empty() {
                    return Err(CheckFailure::MissingPermissions(names(missing)).into());
                }
                Ok(())
            }
            Self::BotHasPermissions(required) => {
                let Some(guild_id) = permission_guild(ctx).await? else {
                    return Ok(());
                };
                let held = match ctx
                    .entities()
                    .member_permissions(guild_id, ctx.bot_id())
                    .await
                {
                    Ok(held) => held,
                    Err(e) if e.is_not_found() => {
                        return Err(
                            CheckFailure::BotMissingPermissions(names(required.names())).into()
                        );
                    }
                    Err(e) => return Err(e.into()),
                };
                let missing = held.missing(*required);
                if !missing.is_empty() {
                    return Err(CheckFailure::BotMissingPermissions(names(missing)).into());
                }
                Ok(())
            }
            Self::IsOwner => match ctx.fetch_guild().await {
                Ok(guild) if guild.owner_id == ctx.author().id => Ok(()),
                Ok(_) => Err(CheckFailure::NotOwner.into()),
                Err(e) if e.is_not_found() => Err(CheckFailure::NotOwner.into()),
                Err(e) => Err(e.into()),
            },
            Self::IsBotOwner => {
                let owners = ctx.entities().bot_owners().await?;
                if owners.contains(&ctx.author().id) {
                    Ok(())
                } else {
                    Err(CheckFailure::NotBotOwner.into())
                }
            }
            Self::GuildOnly => match channel_of(ctx).await? {
                Some(c) if c.kind.is_guild_text() => Ok(()),
                _ => Err(CheckFailure::NotAGuildChannel.into()),
            },
            Self::DmOnly => match channel_of(ctx).await? {
                None => Ok(()),
                Some(c) if c.kind == ChannelKind::Dm => Ok(()),
                Some(_) => Err(CheckFailure::NotADMChannel.into()),
            },
            Self::Maintenance => {
                if ctx.store().exists(MAINTENANCE_KEY).await? {
                    Err(CheckFailure::BotInMaintenance.into())
                } else {
                    Ok(())
                }
            }
            Self::Cooldown(cooldown) => cooldown.check(ctx, command).await,
            Self::Custom { check, .. } => check(ctx.clone()).await,
        }
    }
}

fn permissions_from(names: &[&str]) -> Permissions {
    names
        .iter()
        .filter_map(|n| Permissions::from_name(n))
        .fold(Permissions::empty(), |acc, p| acc | p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::error::CommandError;
    use crate::testing::{BOT_ID, GUILD_ID, TestWorld};
    use shardline_core::SharedStore;
    use tokio_test::assert_ok;

    fn failure(result: CommandResult<()>) -> CheckFailure {
        match result {
            Err(CommandError::Check(f)) => f,
            other => panic!("expected check failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_has_permissions() {
        let world = TestWorld::new();
        let ctx = Arc::new(world.context(""));
        let dm = Arc::new(world.dm_context(""));
        let cmd = Command::new("ban").build();
        let check = Check::has_permissions(&["ban_members", "kick_members"]);

        world.entities.set_permissions(GUILD_ID, 10, Permissions::KICK_MEMBERS);
        assert_eq!(
            failure(check.evaluate(&ctx, &cmd).await),
            CheckFailure::MissingPermissions(vec!["ban_members".into()])
        );

        world.entities.set_permissions(GUILD_ID, 10, Permissions::ADMINISTRATOR);
        assert_ok!(check.evaluate(&ctx, &cmd).await);

        // Outside guilds the check passes.
        assert_ok!(check.evaluate(&dm, &cmd).await);
    }

    #[tokio::test]
    async fn test_bot_has_permissions_without_member() {
        let world = TestWorld::new();
        let ctx = Arc::new(world.context(""));
        let cmd = Command::new("purge").build();
        let check = Check::bot_has_permissions(&["manage_messages"]);

        assert_eq!(
            failure(check.evaluate(&ctx, &cmd).await),
            CheckFailure::BotMissingPermissions(vec!["manage_messages".into()])
        );

        world
            .entities
            .set_permissions(GUILD_ID, BOT_ID, Permissions::MANAGE_MESSAGES);
        assert_ok!(check.evaluate(&ctx, &cmd).await);
    }

    #[tokio::test]
    async fn test_owner_checks() {
        let world = TestWorld::new();
        let ctx = Arc::new(world.context(""));
        let dm = Arc::new(world.dm_context(""));
        let cmd = Command::new("settings").build();

        assert_eq!(
            failure(Check::IsOwner.evaluate(&ctx, &cmd).await),
            CheckFailure::NotOwner
        );
        assert_eq!(
            failure(Check::IsOwner.evaluate(&dm, &cmd).await),
            CheckFailure::NotOwner
        );
        world.entities.set_guild_owner(GUILD_ID, 10);
        assert_ok!(Check::IsOwner.evaluate(&ctx, &cmd).await);

        assert_eq!(
            failure(Check::IsBotOwner.evaluate(&ctx, &cmd).await),
            CheckFailure::NotBotOwner
        );
        world.entities.set_bot_owners(vec![1, 10]);
        assert_ok!(Check::IsBotOwner.evaluate(&ctx, &cmd).await);
    }

    #[tokio::test]
    async fn test_channel_kind_checks() {
        let world = TestWorld::new();
        let ctx = Arc::new(world.context(""));
        let dm = Arc::new(world.dm_context(""));
        let unknown = Arc::new(world.context_in(4242, None, ""));
        let cmd = Command::new("x").build();

        assert_ok!(Check::GuildOnly.evaluate(&ctx, &cmd).await);
        assert_eq!(
            failure(Check::GuildOnly.evaluate(&dm, &cmd).await),
            CheckFailure::NotAGuildChannel
        );
        assert_eq!(
            failure(Check::GuildOnly.evaluate(&unknown, &cmd).await),
            CheckFailure::NotAGuildChannel
        );

        assert_ok!(Check::DmOnly.evaluate(&dm, &cmd).await);
        assert_ok!(Check::DmOnly.evaluate(&unknown, &cmd).await);
        assert_eq!(
            failure(Check::DmOnly.evaluate(&ctx, &cmd).await),
            CheckFailure::NotADMChannel
        );
    }

    #[tokio::test]
    async fn test_maintenance_and_custom() {
        let world = TestWorld::new();
        let ctx = Arc::new(world.context(""));
        let cmd = Command::new("x").build();

        assert_ok!(Check::Maintenance.evaluate(&ctx, &cmd).await);
        world.store.set(MAINTENANCE_KEY, "1").await.unwrap();
        assert_eq!(
            failure(Check::Maintenance.evaluate(&ctx, &cmd).await),
            CheckFailure::BotInMaintenance
        );

        let check = Check::custom("even-channel", |ctx| async move {
            if ctx.channel_id() % 2 == 0 {
                Ok(())
            } else {
                Err(CheckFailure::Failed("odd channel".into()).into())
            }
        });
        assert_eq!(format!("{check:?}"), "Custom(\"even-channel\")");
        assert_eq!(
            failure(check.evaluate(&ctx, &cmd).await),
            CheckFailure::Failed("odd channel".into())
        );
    }
}
