//! Argument converters.
//!
//! Plain converters parse the raw token synchronously. Deferred converters
//! resolve it against the entity cache and may suspend.

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use super::param::Arg;
use crate::context::CommandContext;

pub type ConvertFn = Arc<dyn Fn(&str) -> Result<Arg, String> + Send + Sync>;

/// A converter that needs the invocation context to produce a value.
#[async_trait]
pub trait DeferredConverter: Send + Sync {
    /// User-facing name of the produced type.
    fn type_name(&self) -> &'static str;

    async fn convert(&self, ctx: &CommandContext, raw: &str) -> Result<Arg, String>;
}

/// Turns a raw token into an [`Arg`].
#[derive(Clone, Default)]
pub enum Converter {
    #[default]
    Str,
    Int,
    Float,
    /// `y`, `yes` and `true` (any case) are `true`; everything else is `false`.
    Bool,
    Custom {
        type_name: &'static str,
        convert: ConvertFn,
    },
    Deferred(Arc<dyn DeferredConverter>),
}

impl Converter {
    /// Wraps a synchronous conversion function.
    pub fn custom<F>(type_name: &'static str, convert: F) -> Self
    where
        F: Fn(&str) -> Result<Arg, String> + Send + Sync + 'static,
    {
        Self::Custom {
            type_name,
            convert: Arc::new(convert),
        }
    }

    pub fn deferred(converter: impl DeferredConverter + 'static) -> Self {
        Self::Deferred(Arc::new(converter))
    }

    /// Resolves `<@id>`, `<@!id>` or a bare id to a user.
    pub fn user() -> Self {
        Self::deferred(EntityConverter::User)
    }

    /// Resolves a user mention or id to a member of the current guild.
    pub fn member() -> Self {
        Self::deferred(EntityConverter::Member)
    }

    /// Resolves `<#id>` or a bare id to a channel.
    pub fn channel() -> Self {
        Self::deferred(EntityConverter::Channel)
    }

    /// Resolves `<@&id>` or a bare id to a role of the current guild.
    pub fn role() -> Self {
        Self::deferred(EntityConverter::Role)
    }

    /// Resolves a guild id.
    pub fn guild() -> Self {
        Self::deferred(EntityConverter::Guild)
    }

    /// User-facing name of the produced type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str => "text",
            Self::Int => "number",
            Self::Float => "decimal number",
            Self::Bool => "boolean",
            Self::Custom { type_name, .. } => type_name,
            Self::Deferred(c) => c.type_name(),
        }
    }

    /// Converts one raw value.
    pub async fn convert(&self, ctx: &CommandContext, raw: &str) -> Result<Arg, String> {
        match self {
            Self::Str => Ok(Arg::Str(raw.to_string())),
            Self::Int => raw.parse().map(Arg::Int).map_err(|e| format!("{e}")),
            Self::Float => raw.parse().map(Arg::Float).map_err(|e| format!("{e}")),
            Self::Bool => {
                let lower = raw.to_lowercase();
                Ok(Arg::Bool(matches!(lower.as_str(), "y" | "yes" | "true")))
            }
            Self::Custom { convert, .. } => convert(raw),
            Self::Deferred(c) => c.convert(ctx, raw).await,
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({})", self.type_name())
    }
}

// =============================================================================
// Entity converters
// =============================================================================

static USER_MENTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").ok());
static CHANNEL_MENTION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^<#(\d+)>$").ok());
static ROLE_MENTION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^<@&(\d+)>$").ok());

/// Extracts the id from a mention, or parses the token as a bare id.
fn mention_id(pattern: &LazyLock<Option<Regex>>, raw: &str) -> Option<u64> {
    let id = pattern
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());
    id.parse().ok()
}

/// Built-in converters backed by [`EntityLookup`](shardline_core::EntityLookup).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityConverter {
    User,
    Member,
    Channel,
    Role,
    Guild,
}

#[async_trait]
impl DeferredConverter for EntityConverter {
    fn type_name(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Member => "member",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Guild => "guild",
        }
    }

    async fn convert(&self, ctx: &CommandContext, raw: &str) -> Result<Arg, String> {
        let entities = ctx.entities();
        let found = match self {
            Self::User => match mention_id(&USER_MENTION, raw) {
                Some(id) => entities.user(id).await.ok().map(Arg::User),
                None => None,
            },
            Self::Member => match (ctx.guild_id(), mention_id(&USER_MENTION, raw)) {
                (Some(guild_id), Some(id)) => {
                    entities.member(guild_id, id).await.ok().map(Arg::Member)
                }
                _ => None,
            },
            Self::Channel => match mention_id(&CHANNEL_MENTION, raw) {
                Some(id) => entities.channel(id).await.ok().map(Arg::Channel),
                None => None,
            },
            Self::Role => match (ctx.guild_id(), mention_id(&ROLE_MENTION, raw)) {
                (Some(guild_id), Some(id)) => entities.role(guild_id, id).await.ok().map(Arg::Role),
                _ => None,
            },
            Self::Guild => match raw.parse() {
                Ok(id) => entities.guild(id).await.ok().map(Arg::Guild),
                Err(_) => None,
            },
        };

        found.ok_or_else(|| match self {
            Self::User => "User not found".to_string(),
            Self::Member => "Member not found".to_string(),
            Self::Channel => "Channel not found".to_string(),
            Self::Role => "Role not found".to_string(),
            Self::Guild => "Guild not found".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestWorld, user};

    #[test]
    fn test_mention_id() {
        assert_eq!(mention_id(&USER_MENTION, "<@42>"), Some(42));
        assert_eq!(mention_id(&USER_MENTION, "<@!42>"), Some(42));
        assert_eq!(mention_id(&USER_MENTION, "42"), Some(42));
        assert_eq!(mention_id(&USER_MENTION, "<#42>"), None);
        assert_eq!(mention_id(&ROLE_MENTION, "<@&7>"), Some(7));
        assert_eq!(mention_id(&CHANNEL_MENTION, "<#9>"), Some(9));
    }

    #[tokio::test]
    async fn test_plain_converters() {
        let world = TestWorld::new();
        let ctx = world.context("");

        assert_eq!(Converter::Int.convert(&ctx, "5").await, Ok(Arg::Int(5)));
        assert!(Converter::Int.convert(&ctx, "five").await.is_err());
        assert_eq!(Converter::Float.convert(&ctx, "2.5").await, Ok(Arg::Float(2.5)));
        assert_eq!(Converter::Bool.convert(&ctx, "YES").await, Ok(Arg::Bool(true)));
        assert_eq!(Converter::Bool.convert(&ctx, "nope").await, Ok(Arg::Bool(false)));

        let upper = Converter::custom("shout", |raw| Ok(Arg::Str(raw.to_uppercase())));
        assert_eq!(upper.type_name(), "shout");
        assert_eq!(upper.convert(&ctx, "hi").await, Ok(Arg::Str("HI".into())));
    }

    #[tokio::test]
    async fn test_entity_converters() {
        let world = TestWorld::new();
        world.entities.add_user(user(77, "zed"));
        let ctx = world.context("");

        assert_eq!(
            Converter::user().convert(&ctx, "<@!77>").await,
            Ok(Arg::User(user(77, "zed")))
        );
        assert_eq!(
            Converter::user().convert(&ctx, "<@78>").await,
            Err("User not found".to_string())
        );
        assert_eq!(
            Converter::channel().convert(&ctx, "general").await,
            Err("Channel not found".to_string())
        );
    }
}
