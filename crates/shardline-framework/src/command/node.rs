//! Command definitions and the resolved command tree.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};

use shardline_core::{OutboundResult, StoreResult};
use tower::util::BoxCloneSyncService;
use tower::{BoxError, service_fn};

use super::param::{BoundArgs, Parameter};
use crate::check::Check;
use crate::context::CommandContext;
use crate::cooldown::Cooldown;

/// Type-erased command handler.
pub type CommandHandler = BoxCloneSyncService<Invocation, (), BoxError>;

/// The request a command handler receives.
#[derive(Clone)]
pub struct Invocation {
    pub ctx: Arc<CommandContext>,
    pub command: Arc<CommandNode>,
    pub args: BoundArgs,
}

impl Invocation {
    /// Returns the context bound to the command's module, if it has type `T`.
    pub fn bound<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.command
            .bound_context()
            .and_then(|ctx| ctx.clone().downcast::<T>().ok())
    }

    /// Replies in the invocation channel.
    pub async fn reply(&self, content: &str) -> OutboundResult<()> {
        self.ctx.reply(content).await
    }
}

// ─── Command ──────────────────────────────────────────────────────────────────

/// Builder for a command and its subcommands.
///
/// # Example
///
/// ```rust,ignore
/// let backup = Command::group("backup")
///     .check(Check::GuildOnly)
///     .subcommand(
///         Command::new("load")
///             .param(Parameter::positional("id"))
///             .cooldown(Cooldown::new(1, Duration::from_secs(60), CooldownScope::Guild))
///             .handler(|inv: Invocation| async move {
///                 inv.reply("loading").await?;
///                 Ok(())
///             }),
///     )
///     .build();
/// ```
pub struct Command {
    name: String,
    aliases: Vec<String>,
    description: String,
    hidden: bool,
    params: Vec<Parameter>,
    checks: Vec<Check>,
    cooldown: Option<Cooldown>,
    inherit_checks: bool,
    subcommands: Vec<Command>,
    handler: Option<CommandHandler>,
}

impl Command {
    /// Creates an executable command. Without a handler it replies nothing.
    pub fn new(name: impl Into<String>) -> Self {
        let mut command = Self::group(name);
        command.handler = Some(BoxCloneSyncService::new(service_fn(
            |_: Invocation| async { Ok::<_, BoxError>(()) },
        )));
        command
    }

    /// Creates a command that only groups subcommands and never executes.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            hidden: false,
            params: Vec::new(),
            checks: Vec::new(),
            cooldown: None,
            inherit_checks: true,
            subcommands: Vec::new(),
            handler: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Hides the command from help listings.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Sets the cooldown; it runs after every other check.
    pub fn cooldown(mut self, cooldown: Cooldown) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Whether the parent's checks run before this command's own.
    /// Defaults to `true`.
    pub fn inherit_checks(mut self, inherit: bool) -> Self {
        self.inherit_checks = inherit;
        self
    }

    pub fn subcommand(mut self, command: Command) -> Self {
        self.subcommands.push(command);
        self
    }

    /// Sets the handler from an async function.
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.handler = Some(BoxCloneSyncService::new(service_fn(f)));
        self
    }

    /// Sets the handler from a prepared service.
    pub fn service(mut self, service: CommandHandler) -> Self {
        self.handler = Some(service);
        self
    }

    /// Freezes the builder into a top-level node.
    pub fn build(self) -> Arc<CommandNode> {
        self.build_node(None)
    }

    fn build_node(self, parent: Option<Weak<CommandNode>>) -> Arc<CommandNode> {
        let Command {
            name,
            aliases,
            description,
            hidden,
            params,
            checks,
            cooldown,
            inherit_checks,
            subcommands,
            handler,
        } = self;

        Arc::new_cyclic(|me| CommandNode {
            children: subcommands
                .into_iter()
                .map(|c| c.build_node(Some(me.clone())))
                .collect(),
            name,
            aliases,
            description,
            hidden,
            params,
            checks,
            cooldown,
            inherit_checks,
            parent,
            handler,
            bound: OnceLock::new(),
        })
    }
}

// ─── CommandNode ──────────────────────────────────────────────────────────────

/// An immutable node of the command tree.
pub struct CommandNode {
    name: String,
    aliases: Vec<String>,
    description: String,
    hidden: bool,
    params: Vec<Parameter>,
    checks: Vec<Check>,
    cooldown: Option<Cooldown>,
    inherit_checks: bool,
    parent: Option<Weak<CommandNode>>,
    children: Vec<Arc<CommandNode>>,
    handler: Option<CommandHandler>,
    bound: OnceLock<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.full_name())
            .field("aliases", &self.aliases)
            .field("params", &self.params)
            .field("checks", &self.checks)
            .field("cooldown", &self.cooldown)
            .field(
                "children",
                &self.children.iter().map(|c| &c.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl CommandNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn cooldown(&self) -> Option<&Cooldown> {
        self.cooldown.as_ref()
    }

    pub fn children(&self) -> &[Arc<CommandNode>] {
        &self.children
    }

    pub fn parent(&self) -> Option<Arc<CommandNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Names from the root down to this node, separated by spaces.
    pub fn full_name(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{} {}", parent.full_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// e.g. `backup load <id> [chatlog=false]`.
    pub fn usage(&self) -> String {
        let mut usage = self.full_name();
        for param in &self.params {
            usage.push(' ');
            usage.push_str(&param.usage());
        }
        usage
    }

    /// First description line, cut at 50 characters.
    pub fn brief(&self) -> String {
        let Some(line) = self.description.lines().next() else {
            return String::new();
        };
        if line.chars().count() > 50 {
            format!("{}...", line.chars().take(50).collect::<String>())
        } else {
            line.to_string()
        }
    }

    /// Whether this node has a handler.
    pub fn can_execute(&self) -> bool {
        self.handler.is_some()
    }

    pub fn matches(&self, token: &str) -> bool {
        self.name == token || self.aliases.iter().any(|a| a == token)
    }

    /// Walks down the tree along `tokens`.
    ///
    /// The first child whose name or alias equals the next token is
    /// followed. When no deeper node can execute, this node is the result if
    /// it can; the unconsumed tokens become its arguments.
    pub fn resolve(self: &Arc<Self>, tokens: &[String]) -> Option<(Arc<CommandNode>, Vec<String>)> {
        if let Some((first, rest)) = tokens.split_first() {
            for child in self.children.iter().filter(|c| c.matches(first)) {
                if let Some(found) = child.resolve(rest) {
                    return Some(found);
                }
            }
        }
        self.can_execute()
            .then(|| (Arc::clone(self), tokens.to_vec()))
    }

    fn inherited_chain(&self) -> Vec<Check> {
        let mut chain = match self.parent() {
            Some(parent) if self.inherit_checks => parent.inherited_chain(),
            _ => Vec::new(),
        };
        chain.extend(self.checks.iter().cloned());
        chain
    }

    /// Checks in evaluation order: inherited, own, then the own cooldown.
    ///
    /// A parent's cooldown is not inherited.
    pub fn effective_checks(&self) -> Vec<Check> {
        let mut chain = self.inherited_chain();
        if let Some(cooldown) = self.cooldown {
            chain.push(Check::Cooldown(cooldown));
        }
        chain
    }

    pub(crate) fn handler(&self) -> Option<CommandHandler> {
        self.handler.clone()
    }

    /// Attaches a shared context to this node and every descendant.
    ///
    /// A node keeps the first context it receives.
    pub fn bind_context(&self, context: Arc<dyn Any + Send + Sync>) {
        let _ = self.bound.set(context.clone());
        for child in &self.children {
            child.bind_context(context.clone());
        }
    }

    pub fn bound_context(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.bound.get()
    }

    /// Clears this command's cooldown counter for the invocation's scope.
    pub async fn reset_cooldown(&self, ctx: &CommandContext) -> StoreResult<()> {
        match &self.cooldown {
            Some(cooldown) => cooldown.reset(ctx, self).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::command::param::Arg;
    use crate::cooldown::CooldownScope;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tree() -> Arc<CommandNode> {
        Command::new("a")
            .subcommand(Command::new("b").subcommand(Command::new("c")))
            .build()
    }

    #[test]
    fn test_resolve_deepest_match() {
        let root = tree();

        let (cmd, rest) = root.resolve(&tokens(&["b", "c"])).unwrap();
        assert_eq!(cmd.full_name(), "a b c");
        assert!(rest.is_empty());

        let (cmd, rest) = root.resolve(&tokens(&["b", "x"])).unwrap();
        assert_eq!(cmd.full_name(), "a b");
        assert_eq!(rest, vec!["x"]);
    }

    #[test]
    fn test_resolve_falls_back_to_executable_ancestor() {
        let root = Command::group("backup")
            .subcommand(Command::new("list").alias("ls"))
            .build();

        let (cmd, _) = root.resolve(&tokens(&["ls"])).unwrap();
        assert_eq!(cmd.full_name(), "backup list");
        assert!(root.resolve(&tokens(&["nope"])).is_none());
        assert!(root.resolve(&[]).is_none());
    }

    #[test]
    fn test_effective_checks_order() {
        let cooldown = Cooldown::new(1, Duration::from_secs(1), CooldownScope::Author);
        let root = Command::group("admin")
            .check(Check::GuildOnly)
            .cooldown(cooldown)
            .subcommand(Command::new("ban").check(Check::IsOwner).cooldown(cooldown))
            .subcommand(
                Command::new("free")
                    .inherit_checks(false)
                    .check(Check::DmOnly),
            )
            .build();

        let ban = &root.children()[0];
        let names: Vec<String> = ban
            .effective_checks()
            .iter()
            .map(|c| format!("{c:?}"))
            .collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], "GuildOnly");
        assert_eq!(names[1], "IsOwner");
        assert!(names[2].starts_with("Cooldown"));

        let free = &root.children()[1];
        assert_eq!(free.effective_checks().len(), 1);
    }

    #[test]
    fn test_usage_and_brief() {
        let root = Command::group("backup")
            .subcommand(
                Command::new("load")
                    .description("Load a backup onto this server, replacing every channel and role\nMore.")
                    .param(Parameter::positional("id"))
                    .param(Parameter::positional("chatlog").default(Arg::Int(20)))
                    .param(Parameter::keyword_only("options")),
            )
            .build();
        let load = &root.children()[0];

        assert_eq!(load.usage(), "backup load <id> [chatlog=20] options...");
        assert_eq!(
            load.brief(),
            "Load a backup onto this server, replacing every ch..."
        );
        assert_eq!(root.brief(), "");
    }

    #[test]
    fn test_bind_context_reaches_subcommands() {
        let root = tree();
        root.bind_context(Arc::new(5_u32));
        let c = &root.children()[0].children()[0];
        let bound = c.bound_context().unwrap().clone().downcast::<u32>().unwrap();
        assert_eq!(*bound, 5);
    }
}
