//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use shardline_core::{
    ChannelInfo, ChannelKind, EntityLookup, GuildInfo, LookupError, LookupResult, MemberInfo,
    MemoryStore, MessageInfo, Outbound, OutboundResult, Permissions, RoleInfo, ShardId, UserInfo,
};

use crate::context::{CommandContext, Services};

pub const AUTHOR_ID: u64 = 10;
pub const BOT_ID: u64 = 99;
pub const GUILD_ID: u64 = 1000;
pub const GUILD_CHANNEL_ID: u64 = 1001;
pub const DM_CHANNEL_ID: u64 = 2000;

pub fn user(id: u64, name: &str) -> UserInfo {
    UserInfo {
        id,
        username: name.to_string(),
        discriminator: None,
        bot: false,
    }
}

#[derive(Default)]
pub struct TestEntities {
    channels: Mutex<HashMap<u64, ChannelInfo>>,
    guilds: Mutex<HashMap<u64, GuildInfo>>,
    users: Mutex<HashMap<u64, UserInfo>>,
    roles: Mutex<HashMap<(u64, u64), RoleInfo>>,
    permissions: Mutex<HashMap<(u64, u64), Permissions>>,
    owners: Mutex<Vec<u64>>,
}

impl TestEntities {
    pub fn add_channel(&self, id: u64, kind: ChannelKind, guild_id: Option<u64>) {
        self.channels.lock().insert(
            id,
            ChannelInfo {
                id,
                kind,
                guild_id,
                name: None,
            },
        );
    }

    pub fn add_user(&self, user: UserInfo) {
        self.users.lock().insert(user.id, user);
    }

    pub fn add_role(&self, guild_id: u64, role: RoleInfo) {
        self.roles.lock().insert((guild_id, role.id), role);
    }

    pub fn set_guild_owner(&self, guild_id: u64, owner_id: u64) {
        self.guilds.lock().insert(
            guild_id,
            GuildInfo {
                id: guild_id,
                name: "test guild".into(),
                owner_id,
            },
        );
    }

    pub fn set_permissions(&self, guild_id: u64, user_id: u64, permissions: Permissions) {
        self.permissions
            .lock()
            .insert((guild_id, user_id), permissions);
    }

    pub fn set_bot_owners(&self, owners: Vec<u64>) {
        *self.owners.lock() = owners;
    }
}

#[async_trait]
impl EntityLookup for TestEntities {
    async fn channel(&self, channel_id: u64) -> LookupResult<ChannelInfo> {
        self.channels
            .lock()
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| LookupError::not_found("channel", channel_id))
    }

    async fn guild(&self, guild_id: u64) -> LookupResult<GuildInfo> {
        self.guilds
            .lock()
            .get(&guild_id)
            .cloned()
            .ok_or_else(|| LookupError::not_found("guild", guild_id))
    }

    async fn member(&self, guild_id: u64, user_id: u64) -> LookupResult<MemberInfo> {
        if !self.permissions.lock().contains_key(&(guild_id, user_id)) {
            return Err(LookupError::not_found("member", user_id));
        }
        Ok(MemberInfo {
            user: self.user(user_id).await?,
            nick: None,
            roles: Vec::new(),
        })
    }

    async fn user(&self, user_id: u64) -> LookupResult<UserInfo> {
        self.users
            .lock()
            .get(&user_id)
            .cloned()
            .ok_or_else(|| LookupError::not_found("user", user_id))
    }

    async fn role(&self, guild_id: u64, role_id: u64) -> LookupResult<RoleInfo> {
        self.roles
            .lock()
            .get(&(guild_id, role_id))
            .cloned()
            .ok_or_else(|| LookupError::not_found("role", role_id))
    }

    async fn member_permissions(&self, guild_id: u64, user_id: u64) -> LookupResult<Permissions> {
        self.permissions
            .lock()
            .get(&(guild_id, user_id))
            .copied()
            .ok_or_else(|| LookupError::not_found("member", user_id))
    }

    async fn bot_owners(&self) -> LookupResult<Vec<u64>> {
        Ok(self.owners.lock().clone())
    }
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(u64, String)>>,
}

impl RecordingOutbound {
    pub fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_message(&self, channel_id: u64, content: &str) -> OutboundResult<()> {
        self.sent.lock().push((channel_id, content.to_string()));
        Ok(())
    }
}

/// A guild with one text channel, a DM channel and one author.
pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub entities: Arc<TestEntities>,
    pub outbound: Arc<RecordingOutbound>,
}

impl TestWorld {
    pub fn new() -> Self {
        let entities = Arc::new(TestEntities::default());
        entities.add_channel(GUILD_CHANNEL_ID, ChannelKind::GuildText, Some(GUILD_ID));
        entities.add_channel(DM_CHANNEL_ID, ChannelKind::Dm, None);
        entities.set_guild_owner(GUILD_ID, 1);
        Self {
            store: Arc::new(MemoryStore::new()),
            entities,
            outbound: Arc::new(RecordingOutbound::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services::new(
            self.store.clone(),
            self.entities.clone(),
            self.outbound.clone(),
        )
    }

    pub fn context_in(&self, channel_id: u64, guild_id: Option<u64>, content: &str) -> CommandContext {
        let message = MessageInfo {
            id: 1,
            channel_id,
            guild_id,
            author: user(AUTHOR_ID, "alice"),
            content: content.to_string(),
        };
        CommandContext::new(ShardId::Id(0), message, self.services(), BOT_ID).with_prefix("!")
    }

    /// A message in the guild text channel.
    pub fn context(&self, content: &str) -> CommandContext {
        self.context_in(GUILD_CHANNEL_ID, Some(GUILD_ID), content)
    }

    /// A message in the DM channel.
    pub fn dm_context(&self, content: &str) -> CommandContext {
        self.context_in(DM_CHANNEL_ID, None, content)
    }
}
