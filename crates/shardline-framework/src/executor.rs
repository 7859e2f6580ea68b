//! Runs command lines end to end.
//!
//! `process` is the entry point for the `command` event: tokenize, resolve,
//! drop blacklisted callers, bind arguments, evaluate checks, call the
//! handler. Failures go through the [`ErrorClassifier`] and the
//! [`AbuseGuard`] before anything is sent back.

use std::sync::Arc;

use tower::ServiceExt;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::abuse::{AbuseGuard, Escalation};
use crate::classifier::{ErrorClassifier, Outcome};
use crate::command::{CommandNode, CommandTable, Invocation, Resolved, bind, tokenize};
use crate::context::CommandContext;
use crate::error::{CommandError, CommandResult};

pub struct Executor {
    table: Arc<CommandTable>,
    classifier: ErrorClassifier,
    abuse: AbuseGuard,
    prefix: Option<String>,
}

impl Executor {
    pub fn new(table: Arc<CommandTable>, abuse: AbuseGuard) -> Self {
        Self {
            table,
            classifier: ErrorClassifier::default(),
            abuse,
            prefix: None,
        }
    }

    /// Strips `prefix` from command lines that start with it, and uses it in
    /// help hints.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.classifier = ErrorClassifier::new(prefix.clone());
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn table(&self) -> &Arc<CommandTable> {
        &self.table
    }

    fn command_line<'a>(&self, content: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => content.strip_prefix(prefix.as_str()).unwrap_or(content),
            None => content,
        }
    }

    /// Handles one message. Errors are reported to the caller, never returned.
    pub async fn process(&self, ctx: Arc<CommandContext>) {
        let tokens = tokenize(self.command_line(&ctx.message().content));
        let Ok(resolved) = self.table.resolve(&tokens) else {
            return;
        };

        match self.abuse.is_blacklisted(ctx.message()).await {
            Ok(true) => {
                debug!(author = ctx.author().id, "Ignoring command from blacklisted scope");
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to read blacklist"),
        }

        let span = info_span!(
            "command",
            command = %resolved.command.full_name(),
            author = ctx.author().id,
            channel = ctx.channel_id(),
        );
        async {
            if let Err(e) = self.execute(&ctx, &resolved).await {
                self.handle_error(&ctx, &resolved.command, e).await;
            }
        }
        .instrument(span)
        .await
    }

    /// Runs a command line programmatically, without error reporting.
    ///
    /// A line that resolves to nothing does nothing.
    pub async fn invoke(&self, ctx: Arc<CommandContext>, line: &str) -> CommandResult<()> {
        match self.table.resolve(&tokenize(line)) {
            Ok(resolved) => self.execute(&ctx, &resolved).await,
            Err(CommandError::CommandNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Binds arguments, evaluates checks in order, then calls the handler.
    pub async fn execute(&self, ctx: &Arc<CommandContext>, resolved: &Resolved) -> CommandResult<()> {
        let command = &resolved.command;
        let args = bind(command.params(), ctx, resolved.args.clone()).await?;

        for check in command.effective_checks() {
            check.evaluate(ctx, command).await?;
        }

        let handler = command.handler().ok_or(CommandError::CommandNotFound)?;
        let invocation = Invocation {
            ctx: ctx.clone(),
            command: command.clone(),
            args,
        };
        handler
            .oneshot(invocation)
            .await
            .map_err(CommandError::from_boxed)
    }

    async fn handle_error(&self, ctx: &CommandContext, command: &CommandNode, err: CommandError) {
        if err.is_silent() {
            debug!(error = %err, "Command ended silently");
            return;
        }

        match self.abuse.record_failure(ctx.message()).await {
            Ok(Escalation::Blacklisted) => return,
            Ok(Escalation::Counted(_)) => {}
            Err(e) => warn!(error = %e, "Failed to record command error"),
        }

        let text = match self.classifier.classify(&err, command) {
            Outcome::Silent => return,
            Outcome::Notice(text) => {
                debug!(error = %err, "Command refused");
                text
            }
            Outcome::Unexpected { summary } => {
                error!(error = ?err, "Command failed");
                summary
            }
        };

        if let Err(e) = ctx.reply(&text).await {
            warn!(error = %e, "Failed to send error notice");
        }
    }
}
