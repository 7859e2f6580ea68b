//! Entity projections and the lookup boundary.
//!
//! The worker never owns the entity cache; it reads guild, channel, role and
//! member records through [`EntityLookup`]. The records here are plain
//! projections carrying only the fields the command pipeline needs.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use async_trait::async_trait;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LookupResult;

// =============================================================================
// Snowflake serde helpers
// =============================================================================

/// Serde adapters for ids sent either as strings or as integers.
pub mod snowflake {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Str(String),
    }

    impl Repr {
        fn into_id<E: serde::de::Error>(self) -> Result<u64, E> {
            match self {
                Self::Num(n) => Ok(n),
                Self::Str(s) => s.parse().map_err(E::custom),
            }
        }
    }

    pub fn serialize<S: Serializer>(id: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Repr::deserialize(d)?.into_id()
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(id: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
            match id {
                Some(id) => s.serialize_some(&id.to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
            Option::<Repr>::deserialize(d)?
                .map(Repr::into_id)
                .transpose()
        }
    }

    pub mod vec {
        use super::*;

        pub fn serialize<S: Serializer>(ids: &[u64], s: S) -> Result<S::Ok, S::Error> {
            s.collect_seq(ids.iter().map(u64::to_string))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
            Vec::<Repr>::deserialize(d)?
                .into_iter()
                .map(Repr::into_id)
                .collect()
        }
    }
}

// =============================================================================
// Channel kinds
// =============================================================================

/// Channel type as reported by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelKind {
    GuildText,
    Dm,
    GuildVoice,
    GroupDm,
    GuildCategory,
    GuildNews,
    Other(u8),
}

impl ChannelKind {
    /// Returns `true` for text channels that live inside a guild.
    pub fn is_guild_text(&self) -> bool {
        matches!(self, Self::GuildText | Self::GuildNews)
    }

    /// Returns `true` for one-to-one and group direct messages.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Dm | Self::GroupDm)
    }
}

impl From<u8> for ChannelKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildNews,
            other => Self::Other(other),
        }
    }
}

impl From<ChannelKind> for u8 {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::GuildText => 0,
            ChannelKind::Dm => 1,
            ChannelKind::GuildVoice => 2,
            ChannelKind::GroupDm => 3,
            ChannelKind::GuildCategory => 4,
            ChannelKind::GuildNews => 5,
            ChannelKind::Other(other) => other,
        }
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Guild permission bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(u64);

macro_rules! permission_flags {
    ($($(#[$meta:meta])* $konst:ident = $bit:expr, $name:literal;)*) => {
        impl Permissions {
            $($(#[$meta])* pub const $konst: Self = Self(1 << $bit);)*

            const NAMED: &'static [(&'static str, Permissions)] = &[$(($name, Self::$konst)),*];
        }
    };
}

permission_flags! {
    CREATE_INSTANT_INVITE = 0, "create_instant_invite";
    KICK_MEMBERS = 1, "kick_members";
    BAN_MEMBERS = 2, "ban_members";
    /// Bypasses every other permission check.
    ADMINISTRATOR = 3, "administrator";
    MANAGE_CHANNELS = 4, "manage_channels";
    MANAGE_GUILD = 5, "manage_guild";
    ADD_REACTIONS = 6, "add_reactions";
    VIEW_AUDIT_LOG = 7, "view_audit_log";
    PRIORITY_SPEAKER = 8, "priority_speaker";
    STREAM = 9, "stream";
    READ_MESSAGES = 10, "read_messages";
    SEND_MESSAGES = 11, "send_messages";
    SEND_TTS_MESSAGES = 12, "send_tts_messages";
    MANAGE_MESSAGES = 13, "manage_messages";
    EMBED_LINKS = 14, "embed_links";
    ATTACH_FILES = 15, "attach_files";
    READ_MESSAGE_HISTORY = 16, "read_message_history";
    MENTION_EVERYONE = 17, "mention_everyone";
    EXTERNAL_EMOJIS = 18, "external_emojis";
    VIEW_GUILD_INSIGHTS = 19, "view_guild_insights";
    CONNECT = 20, "connect";
    SPEAK = 21, "speak";
    MUTE_MEMBERS = 22, "mute_members";
    DEAFEN_MEMBERS = 23, "deafen_members";
    MOVE_MEMBERS = 24, "move_members";
    USE_VOICE_ACTIVATION = 25, "use_voice_activation";
    CHANGE_NICKNAME = 26, "change_nickname";
    MANAGE_NICKNAMES = 27, "manage_nicknames";
    MANAGE_ROLES = 28, "manage_roles";
    MANAGE_WEBHOOKS = 29, "manage_webhooks";
    MANAGE_EMOJIS = 30, "manage_emojis";
}

impl Permissions {
    /// No permissions.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every known permission.
    pub fn all() -> Self {
        Self::NAMED
            .iter()
            .fold(Self::empty(), |acc, (_, flag)| acc | *flag)
    }

    /// Wraps raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Looks up a single permission by its snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the administrator bit is set.
    pub const fn is_administrator(&self) -> bool {
        self.contains(Self::ADMINISTRATOR)
    }

    /// Names of the permissions in this set.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(n, _)| *n)
            .collect()
    }

    /// Names of the permissions in `required` that this set lacks.
    ///
    /// Administrators lack nothing.
    pub fn missing(&self, required: Self) -> Vec<&'static str> {
        if self.is_administrator() {
            return Vec::new();
        }
        Self(required.0 & !self.0).names()
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Permissions").field(&self.names()).finish()
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(u64),
            Str(String),
        }

        match Repr::deserialize(d)? {
            Repr::Num(bits) => Ok(Self(bits)),
            Repr::Str(s) => s.parse().map(Self).map_err(D::Error::custom),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

/// A guild member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user: UserInfo,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default, with = "snowflake::vec")]
    pub roles: Vec<u64>,
}

impl MemberInfo {
    /// Computes guild-level permissions.
    ///
    /// The guild owner holds every permission. Everyone else gets the union
    /// of the `@everyone` role (whose id equals the guild id) and the roles
    /// they carry. `roles` may contain unrelated roles; they are ignored.
    pub fn permissions_in(&self, guild: &GuildInfo, roles: &[RoleInfo]) -> Permissions {
        if self.user.id == guild.owner_id {
            return Permissions::all();
        }
        roles
            .iter()
            .filter(|r| r.id == guild.id || self.roles.contains(&r.id))
            .fold(Permissions::empty(), |acc, r| acc | r.permissions)
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleInfo {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub position: i64,
}

/// A channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(with = "snowflake")]
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default, with = "snowflake::option")]
    pub guild_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildInfo {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub name: String,
    #[serde(with = "snowflake")]
    pub owner_id: u64,
}

/// A message as carried by the `command` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    #[serde(with = "snowflake")]
    pub id: u64,
    #[serde(with = "snowflake")]
    pub channel_id: u64,
    #[serde(default, with = "snowflake::option")]
    pub guild_id: Option<u64>,
    pub author: UserInfo,
    #[serde(default)]
    pub content: String,
}

// =============================================================================
// Lookup boundary
// =============================================================================

/// Read access to guild, channel, role and member records.
///
/// Implementations read an externally populated cache and may fall back to
/// the upstream API. A missing record is [`LookupError::NotFound`].
///
/// [`LookupError::NotFound`]: crate::LookupError::NotFound
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn channel(&self, channel_id: u64) -> LookupResult<ChannelInfo>;

    async fn guild(&self, guild_id: u64) -> LookupResult<GuildInfo>;

    async fn member(&self, guild_id: u64, user_id: u64) -> LookupResult<MemberInfo>;

    async fn user(&self, user_id: u64) -> LookupResult<UserInfo>;

    async fn role(&self, guild_id: u64, role_id: u64) -> LookupResult<RoleInfo>;

    /// Guild-level permissions of a member.
    async fn member_permissions(&self, guild_id: u64, user_id: u64) -> LookupResult<Permissions>;

    /// Ids of the application owner and its team members.
    async fn bot_owners(&self) -> LookupResult<Vec<u64>>;
}
