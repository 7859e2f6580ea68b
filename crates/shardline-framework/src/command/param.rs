//! Command parameters and argument binding.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use shardline_core::{ChannelInfo, GuildInfo, MemberInfo, RoleInfo, UserInfo};

use super::convert::Converter;
use crate::context::CommandContext;
use crate::error::{CommandError, CommandResult};

/// A bound argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// An optional parameter that was not supplied.
    None,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    User(UserInfo),
    Member(MemberInfo),
    Channel(ChannelInfo),
    Role(RoleInfo),
    Guild(GuildInfo),
    List(Vec<Arg>),
    Map(BTreeMap<String, String>),
}

impl Arg {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserInfo> {
        match self {
            Self::User(u) => Some(u),
            Self::Member(m) => Some(&m.user),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&MemberInfo> {
        match self {
            Self::Member(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&ChannelInfo> {
        match self {
            Self::Channel(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_role(&self) -> Option<&RoleInfo> {
        match self {
            Self::Role(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_guild(&self) -> Option<&GuildInfo> {
        match self {
            Self::Guild(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Arg]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::User(u) => f.write_str(&u.username),
            Self::Member(m) => f.write_str(m.nick.as_deref().unwrap_or(&m.user.username)),
            Self::Channel(c) => write!(f, "{}", c.id),
            Self::Role(r) => f.write_str(&r.name),
            Self::Guild(g) => f.write_str(&g.name),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

/// How a parameter consumes tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Exactly one token.
    Positional,
    /// Every remaining token, as a list.
    Variadic,
    /// Every remaining token, joined with spaces.
    KeywordOnly,
    /// Every remaining token, parsed as `key=value` pairs.
    Mapping,
}

/// A declared command parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: ParamKind,
    converter: Converter,
    default: Option<Arg>,
}

impl Parameter {
    fn new(name: impl Into<String>, kind: ParamKind, default: Option<Arg>) -> Self {
        Self {
            name: name.into(),
            kind,
            converter: Converter::Str,
            default,
        }
    }

    /// A required single-token parameter.
    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Positional, None)
    }

    /// Collects the rest of the tokens. Defaults to an empty list.
    pub fn variadic(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Variadic, Some(Arg::List(Vec::new())))
    }

    /// Joins the rest of the tokens. Defaults to an empty string.
    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::KeywordOnly, Some(Arg::Str(String::new())))
    }

    /// Parses the rest of the tokens as `key=value`. Defaults to an empty map.
    pub fn mapping(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Mapping, Some(Arg::Map(BTreeMap::new())))
    }

    /// Sets the converter applied to each consumed value.
    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    /// Sets the value used when no token is left.
    pub fn default(mut self, value: Arg) -> Self {
        self.default = Some(value);
        self
    }

    /// Makes the parameter optional with [`Arg::None`] as its default.
    pub fn optional(self) -> Self {
        self.default(Arg::None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.converter.type_name()
    }

    pub fn default_value(&self) -> Option<&Arg> {
        self.default.as_ref()
    }

    /// Usage fragment: `<name>`, `[name]`, `[name=default]`, `*name`,
    /// `name...` or `**name`.
    pub fn usage(&self) -> String {
        let name = match self.kind {
            ParamKind::Positional => self.name.clone(),
            ParamKind::Variadic => format!("*{}", self.name),
            ParamKind::KeywordOnly => format!("{}...", self.name),
            ParamKind::Mapping => format!("**{}", self.name),
        };
        match &self.default {
            None => format!("<{name}>"),
            Some(value) if self.is_empty_rest(value) => name,
            Some(Arg::None) => format!("[{name}]"),
            Some(value) => format!("[{name}={value}]"),
        }
    }

    /// `true` for the empty default a catch-all kind starts with.
    fn is_empty_rest(&self, value: &Arg) -> bool {
        match (self.kind, value) {
            (ParamKind::Variadic, Arg::List(items)) => items.is_empty(),
            (ParamKind::KeywordOnly, Arg::Str(text)) => text.is_empty(),
            (ParamKind::Mapping, Arg::Map(pairs)) => pairs.is_empty(),
            _ => false,
        }
    }

    fn converter_failed(&self, value: &str, reason: String) -> CommandError {
        CommandError::ConverterFailed {
            parameter: self.name.clone(),
            type_name: self.converter.type_name().to_string(),
            value: value.to_string(),
            reason,
        }
    }

    /// Consumes tokens from the front of `tokens` and converts them.
    pub async fn parse(
        &self,
        ctx: &CommandContext,
        tokens: &mut VecDeque<String>,
    ) -> CommandResult<Arg> {
        if tokens.is_empty() {
            return self
                .default
                .clone()
                .ok_or_else(|| CommandError::NotEnoughArguments {
                    parameter: self.name.clone(),
                });
        }

        match self.kind {
            ParamKind::Positional => {
                let raw = tokens.pop_front().unwrap_or_default();
                self.converter
                    .convert(ctx, &raw)
                    .await
                    .map_err(|reason| self.converter_failed(&raw, reason))
            }
            ParamKind::Variadic => {
                let mut items = Vec::with_capacity(tokens.len());
                for raw in tokens.drain(..) {
                    let item = self
                        .converter
                        .convert(ctx, &raw)
                        .await
                        .map_err(|reason| self.converter_failed(&raw, reason))?;
                    items.push(item);
                }
                Ok(Arg::List(items))
            }
            ParamKind::KeywordOnly => {
                let raw = tokens.drain(..).collect::<Vec<_>>().join(" ");
                self.converter
                    .convert(ctx, &raw)
                    .await
                    .map_err(|reason| self.converter_failed(&raw, reason))
            }
            ParamKind::Mapping => {
                let mut map = BTreeMap::new();
                for raw in tokens.drain(..) {
                    let Some((key, value)) = raw.split_once('=') else {
                        return Err(self.converter_failed(&raw, "expected key=value".into()));
                    };
                    map.insert(key.to_string(), value.to_string());
                }
                Ok(Arg::Map(map))
            }
        }
    }
}

/// Arguments bound to a command's parameters, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    values: Vec<(String, Arg)>,
}

impl BoundArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &str, value: Arg) {
        self.values.push((name.to_string(), value));
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Arg::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Arg::as_int)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Arg::as_bool)
    }

    pub fn list(&self, name: &str) -> Option<&[Arg]> {
        self.get(name).and_then(Arg::as_list)
    }

    /// Values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &Arg> {
        self.values.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Binds `tokens` to `params` in declaration order.
pub async fn bind(
    params: &[Parameter],
    ctx: &CommandContext,
    tokens: Vec<String>,
) -> CommandResult<BoundArgs> {
    let mut tokens: VecDeque<String> = tokens.into();
    let mut bound = BoundArgs::new();
    for param in params {
        let value = param.parse(ctx, &mut tokens).await?;
        bound.push(param.name(), value);
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestWorld;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_positional_then_variadic() {
        let world = TestWorld::new();
        let ctx = world.context("");
        let params = [
            Parameter::positional("count").converter(Converter::Int),
            Parameter::variadic("rest"),
        ];

        let bound = bind(&params, &ctx, tokens(&["5"])).await.unwrap();
        assert_eq!(
            bound.values().cloned().collect::<Vec<_>>(),
            vec![Arg::Int(5), Arg::List(vec![])]
        );

        let bound = bind(&params, &ctx, tokens(&["5", "a", "b"])).await.unwrap();
        assert_eq!(bound.int("count"), Some(5));
        assert_eq!(
            bound.list("rest"),
            Some([Arg::Str("a".into()), Arg::Str("b".into())].as_slice())
        );
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let world = TestWorld::new();
        let ctx = world.context("");
        let params = [Parameter::positional("target")];

        let err = bind(&params, &ctx, vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            CommandError::NotEnoughArguments { parameter } if parameter == "target"
        ));
    }

    #[tokio::test]
    async fn test_defaults_and_keyword_only() {
        let world = TestWorld::new();
        let ctx = world.context("");
        let params = [
            Parameter::positional("amount")
                .converter(Converter::Int)
                .default(Arg::Int(1)),
            Parameter::keyword_only("reason"),
        ];

        let bound = bind(&params, &ctx, vec![]).await.unwrap();
        assert_eq!(bound.int("amount"), Some(1));
        assert_eq!(bound.str("reason"), Some(""));

        let bound = bind(&params, &ctx, tokens(&["3", "too", "loud"])).await.unwrap();
        assert_eq!(bound.int("amount"), Some(3));
        assert_eq!(bound.str("reason"), Some("too loud"));
    }

    #[tokio::test]
    async fn test_mapping() {
        let world = TestWorld::new();
        let ctx = world.context("");
        let params = [Parameter::mapping("options")];

        let bound = bind(&params, &ctx, tokens(&["a=1", "b=x=y"])).await.unwrap();
        let map = bound.get("options").and_then(Arg::as_map).unwrap();
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("x=y"));

        let err = bind(&params, &ctx, tokens(&["broken"])).await.unwrap_err();
        assert!(matches!(err, CommandError::ConverterFailed { .. }));
    }

    #[tokio::test]
    async fn test_converter_failure_carries_value() {
        let world = TestWorld::new();
        let ctx = world.context("");
        let params = [Parameter::positional("count").converter(Converter::Int)];

        match bind(&params, &ctx, tokens(&["many"])).await {
            Err(CommandError::ConverterFailed {
                parameter,
                type_name,
                value,
                ..
            }) => {
                assert_eq!(parameter, "count");
                assert_eq!(type_name, "number");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_usage_fragments() {
        assert_eq!(Parameter::positional("a").usage(), "<a>");
        assert_eq!(Parameter::positional("a").optional().usage(), "[a]");
        assert_eq!(
            Parameter::positional("n").default(Arg::Int(3)).usage(),
            "[n=3]"
        );
        assert_eq!(Parameter::keyword_only("text").usage(), "text...");
        assert_eq!(Parameter::variadic("rest").usage(), "*rest");
        assert_eq!(Parameter::mapping("opts").usage(), "**opts");
        assert_eq!(
            Parameter::keyword_only("text")
                .default(Arg::Str("none".into()))
                .usage(),
            "[text...=none]"
        );
    }
}
