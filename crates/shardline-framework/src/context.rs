//! Per-invocation command context.

use std::fmt;
use std::sync::Arc;

use shardline_core::{
    ChannelInfo, EntityLookup, GuildInfo, LookupError, LookupResult, MemberInfo, MessageInfo,
    Outbound, OutboundResult, ShardId, StoreRef, UserInfo,
};

/// The collaborators a worker hands to commands and listeners.
#[derive(Clone)]
pub struct Services {
    pub store: StoreRef,
    pub entities: Arc<dyn EntityLookup>,
    pub outbound: Arc<dyn Outbound>,
}

impl Services {
    pub fn new(
        store: StoreRef,
        entities: Arc<dyn EntityLookup>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            store,
            entities,
            outbound,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Everything a check or handler knows about the message being processed.
#[derive(Debug, Clone)]
pub struct CommandContext {
    shard_id: ShardId,
    message: MessageInfo,
    services: Services,
    bot_id: u64,
    prefix: String,
}

impl CommandContext {
    pub fn new(shard_id: ShardId, message: MessageInfo, services: Services, bot_id: u64) -> Self {
        Self {
            shard_id,
            message,
            services,
            bot_id,
            prefix: String::new(),
        }
    }

    /// Sets the command prefix shown in help hints.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn message(&self) -> &MessageInfo {
        &self.message
    }

    pub fn author(&self) -> &UserInfo {
        &self.message.author
    }

    pub fn channel_id(&self) -> u64 {
        self.message.channel_id
    }

    pub fn guild_id(&self) -> Option<u64> {
        self.message.guild_id
    }

    pub fn bot_id(&self) -> u64 {
        self.bot_id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn store(&self) -> &StoreRef {
        &self.services.store
    }

    pub fn entities(&self) -> &Arc<dyn EntityLookup> {
        &self.services.entities
    }

    /// Sends `content` to the channel the message came from.
    pub async fn reply(&self, content: &str) -> OutboundResult<()> {
        self.services
            .outbound
            .send_message(self.message.channel_id, content)
            .await
    }

    pub async fn fetch_channel(&self) -> LookupResult<ChannelInfo> {
        self.services.entities.channel(self.message.channel_id).await
    }

    /// Fetches the guild of the message; direct messages have none.
    pub async fn fetch_guild(&self) -> LookupResult<GuildInfo> {
        match self.message.guild_id {
            Some(guild_id) => self.services.entities.guild(guild_id).await,
            None => Err(LookupError::not_found("guild", self.message.channel_id)),
        }
    }

    /// Fetches the bot's own member record in the message's guild.
    pub async fn fetch_bot_member(&self) -> LookupResult<MemberInfo> {
        match self.message.guild_id {
            Some(guild_id) => self.services.entities.member(guild_id, self.bot_id).await,
            None => Err(LookupError::not_found("member", self.bot_id)),
        }
    }
}
