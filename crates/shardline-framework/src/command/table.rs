use std::sync::Arc;

use parking_lot::RwLock;

use super::node::CommandNode;
use crate::error::{CommandError, CommandResult};

/// A resolved command and the tokens left for its parameters.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub command: Arc<CommandNode>,
    pub args: Vec<String>,
}

/// The set of top-level commands.
///
/// The table itself never executes; a line that matches no top-level
/// command is [`CommandError::CommandNotFound`].
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: RwLock<Vec<Arc<CommandNode>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, command: Arc<CommandNode>) {
        self.commands.write().push(command);
    }

    /// Adds every command of `other`.
    pub fn extend(&self, other: &CommandTable) {
        let commands = other.commands();
        self.commands.write().extend(commands);
    }

    /// Removes top-level commands named `name`. Returns `true` if any was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut commands = self.commands.write();
        let before = commands.len();
        commands.retain(|c| c.name() != name);
        commands.len() != before
    }

    /// Snapshot of the top-level commands.
    pub fn commands(&self) -> Vec<Arc<CommandNode>> {
        self.commands.read().clone()
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Looks up a command by its full name, e.g. `"backup load"`.
    pub fn find(&self, full_name: &str) -> Option<Arc<CommandNode>> {
        let mut parts = full_name.split_whitespace();
        let first = parts.next()?;
        let mut node = self.commands().into_iter().find(|c| c.matches(first))?;
        for part in parts {
            node = node.children().iter().find(|c| c.matches(part))?.clone();
        }
        Some(node)
    }

    /// Resolves a tokenized command line.
    pub fn resolve(&self, tokens: &[String]) -> CommandResult<Resolved> {
        let Some((first, rest)) = tokens.split_first() else {
            return Err(CommandError::CommandNotFound);
        };

        self.commands()
            .iter()
            .filter(|c| c.matches(first))
            .find_map(|c| c.resolve(rest))
            .map(|(command, args)| Resolved { command, args })
            .ok_or(CommandError::CommandNotFound)
    }
}
