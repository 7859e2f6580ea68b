//! Read-through entity lookup over the shared store.
//!
//! The gateway keeps JSON records in these hashes:
//!
//! | Key | Field | Record |
//! |-----|-------|--------|
//! | `channels` | channel id | [`ChannelInfo`] |
//! | `guilds` | guild id | [`GuildInfo`] |
//! | `roles` | role id | [`RoleInfo`] |
//! | `guilds:{guild_id}:members` | user id | [`MemberInfo`] |
//!
//! Misses fall back to the REST API. Nothing is written back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::trace;

use shardline_core::{
    ChannelInfo, EntityLookup, GuildInfo, LookupError, LookupResult, MemberInfo, Permissions,
    RoleInfo, StoreRef, UserInfo,
};
use shardline_transport::{HttpError, RestClient};

pub struct CachedEntities {
    store: StoreRef,
    rest: Arc<RestClient>,
    owners: OnceCell<Vec<u64>>,
}

impl CachedEntities {
    pub fn new(store: StoreRef, rest: Arc<RestClient>) -> Self {
        Self {
            store,
            rest,
            owners: OnceCell::new(),
        }
    }

    async fn cached<T: DeserializeOwned>(
        &self,
        key: &str,
        id: u64,
        kind: &'static str,
    ) -> LookupResult<Option<T>> {
        let Some(raw) = self.store.hget(key, &id.to_string()).await? else {
            trace!(key, id, "cache miss");
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| LookupError::Decode {
                kind,
                reason: e.to_string(),
            })
    }

    async fn guild_roles(&self, guild_id: u64, member: &MemberInfo) -> LookupResult<Vec<RoleInfo>> {
        let mut roles = Vec::with_capacity(member.roles.len() + 1);
        for role_id in std::iter::once(guild_id).chain(member.roles.iter().copied()) {
            match self.cached::<RoleInfo>("roles", role_id, "role").await? {
                Some(role) => roles.push(role),
                None => {
                    return self
                        .rest
                        .get_guild_roles(guild_id)
                        .await
                        .map_err(|e| upstream("guild", guild_id, e));
                }
            }
        }
        Ok(roles)
    }
}

/// Maps a REST failure to a lookup error.
fn upstream(kind: &'static str, id: u64, err: HttpError) -> LookupError {
    match err {
        HttpError::NotFound { .. } => LookupError::not_found(kind, id),
        other => LookupError::Upstream(other.to_string()),
    }
}

#[async_trait]
impl EntityLookup for CachedEntities {
    async fn channel(&self, channel_id: u64) -> LookupResult<ChannelInfo> {
        if let Some(channel) = self.cached("channels", channel_id, "channel").await? {
            return Ok(channel);
        }
        self.rest
            .get_channel(channel_id)
            .await
            .map_err(|e| upstream("channel", channel_id, e))
    }

    async fn guild(&self, guild_id: u64) -> LookupResult<GuildInfo> {
        if let Some(guild) = self.cached("guilds", guild_id, "guild").await? {
            return Ok(guild);
        }
        self.rest
            .get_guild(guild_id)
            .await
            .map_err(|e| upstream("guild", guild_id, e))
    }

    async fn member(&self, guild_id: u64, user_id: u64) -> LookupResult<MemberInfo> {
        let key = format!("guilds:{guild_id}:members");
        if let Some(member) = self.cached(&key, user_id, "member").await? {
            return Ok(member);
        }
        self.rest
            .get_member(guild_id, user_id)
            .await
            .map_err(|e| upstream("member", user_id, e))
    }

    async fn user(&self, user_id: u64) -> LookupResult<UserInfo> {
        self.rest
            .get_user(user_id)
            .await
            .map_err(|e| upstream("user", user_id, e))
    }

    async fn role(&self, guild_id: u64, role_id: u64) -> LookupResult<RoleInfo> {
        if let Some(role) = self.cached("roles", role_id, "role").await? {
            return Ok(role);
        }
        self.rest
            .get_guild_roles(guild_id)
            .await
            .map_err(|e| upstream("guild", guild_id, e))?
            .into_iter()
            .find(|r| r.id == role_id)
            .ok_or_else(|| LookupError::not_found("role", role_id))
    }

    async fn member_permissions(&self, guild_id: u64, user_id: u64) -> LookupResult<Permissions> {
        let guild = self.guild(guild_id).await?;
        let member = self.member(guild_id, user_id).await?;
        let roles = self.guild_roles(guild_id, &member).await?;
        Ok(member.permissions_in(&guild, &roles))
    }

    async fn bot_owners(&self) -> LookupResult<Vec<u64>> {
        self.owners
            .get_or_try_init(|| async {
                self.rest
                    .application_info()
                    .await
                    .map(|info| info.owner_ids())
                    .map_err(|e| LookupError::Upstream(e.to_string()))
            })
            .await
            .cloned()
    }
}
