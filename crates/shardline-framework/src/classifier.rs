//! Maps command errors to what the caller gets to see.

use crate::command::CommandNode;
use crate::error::{CheckFailure, CommandError};

/// What to do with a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Say nothing.
    Silent,
    /// Tell the caller what went wrong.
    Notice(String),
    /// An error with no dedicated message; log it and show a short summary.
    Unexpected { summary: String },
}

/// Turns [`CommandError`]s into [`Outcome`]s.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    prefix: String,
}

impl ErrorClassifier {
    /// `prefix` is used in help hints such as `!help backup load`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn classify(&self, err: &CommandError, command: &CommandNode) -> Outcome {
        match err {
            CommandError::CommandNotFound | CommandError::Cancelled => Outcome::Silent,
            CommandError::NotEnoughArguments { parameter } => {
                let full = command.full_name();
                Outcome::Notice(format!(
                    "The command `{full}` is **missing the `{parameter}` argument**.\n\
                     Use `{}help {full}` to get more information.",
                    self.prefix
                ))
            }
            CommandError::ConverterFailed {
                parameter,
                type_name,
                value,
                ..
            } => Outcome::Notice(format!(
                "The **value `{value}`** passed to `{parameter}` is **not a valid `{type_name}`**"
            )),
            CommandError::Check(failure) => classify_check(failure),
            other => Outcome::Unexpected {
                summary: format!("```{}:\n{other}```", other.kind()),
            },
        }
    }
}

fn classify_check(failure: &CheckFailure) -> Outcome {
    let notice = match failure {
        CheckFailure::MissingPermissions(missing) => format!(
            "You are **missing** the following **permissions**: `{}`.",
            missing.join(", ")
        ),
        CheckFailure::BotMissingPermissions(missing) => format!(
            "The bot is **missing** the following **permissions**: `{}`.",
            missing.join(", ")
        ),
        CheckFailure::NotOwner => {
            "This command can **only** be used by the **server owner**.".to_string()
        }
        CheckFailure::NotBotOwner => {
            "This command can **only** be used by the **bot owner**.".to_string()
        }
        CheckFailure::NotAGuildChannel => {
            "This command can **only** be used **inside a guild**.".to_string()
        }
        CheckFailure::NotADMChannel => {
            "This command can **only** be used in **direct messages**.".to_string()
        }
        CheckFailure::CommandOnCooldown { warned: true, .. } => return Outcome::Silent,
        CheckFailure::CommandOnCooldown { remaining, .. } => format!(
            "This **command** is currently on **cooldown**.\n\
             You have to **wait `{}` seconds** until you can use it again.",
            remaining.as_secs_f64().ceil() as u64
        ),
        CheckFailure::BotInMaintenance => {
            "The bot is currently in **maintenance**. Please try again later.".to_string()
        }
        CheckFailure::Failed(reason) => reason.clone(),
    };
    Outcome::Notice(notice)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::command::Command;
    use crate::cooldown::CooldownScope;
    use shardline_core::StoreError;

    fn load() -> std::sync::Arc<CommandNode> {
        let root = Command::group("backup")
            .subcommand(Command::new("load"))
            .build();
        root.children()[0].clone()
    }

    #[test]
    fn test_argument_notices() {
        let classifier = ErrorClassifier::new("x!");
        let cmd = load();

        let outcome = classifier.classify(
            &CommandError::NotEnoughArguments {
                parameter: "id".into(),
            },
            &cmd,
        );
        assert_eq!(
            outcome,
            Outcome::Notice(
                "The command `backup load` is **missing the `id` argument**.\n\
                 Use `x!help backup load` to get more information."
                    .into()
            )
        );

        let outcome = classifier.classify(
            &CommandError::ConverterFailed {
                parameter: "count".into(),
                type_name: "number".into(),
                value: "ten".into(),
                reason: "invalid digit".into(),
            },
            &cmd,
        );
        assert_eq!(
            outcome,
            Outcome::Notice("The **value `ten`** passed to `count` is **not a valid `number`**".into())
        );
    }

    #[test]
    fn test_cooldown_notice_once() {
        let classifier = ErrorClassifier::default();
        let cmd = load();
        let cooldown = |warned| {
            CommandError::Check(CheckFailure::CommandOnCooldown {
                rate: 1,
                per: Duration::from_secs(10),
                scope: CooldownScope::Author,
                remaining: Duration::from_millis(7300),
                warned,
            })
        };

        match classifier.classify(&cooldown(false), &cmd) {
            Outcome::Notice(text) => assert!(text.contains("**wait `8` seconds**")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(classifier.classify(&cooldown(true), &cmd), Outcome::Silent);
    }

    #[test]
    fn test_silent_and_unexpected() {
        let classifier = ErrorClassifier::default();
        let cmd = load();

        assert_eq!(
            classifier.classify(&CommandError::CommandNotFound, &cmd),
            Outcome::Silent
        );
        assert_eq!(
            classifier.classify(&CommandError::Cancelled, &cmd),
            Outcome::Silent
        );
        assert_eq!(
            classifier.classify(&CommandError::Handler("disk full".into()), &cmd),
            Outcome::Unexpected {
                summary: "```HandlerError:\ndisk full```".into()
            }
        );
        assert_eq!(
            classifier.classify(
                &CommandError::Store(StoreError::Connection("refused".into())),
                &cmd
            ),
            Outcome::Unexpected {
                summary: format!(
                    "```StoreError:\n{}```",
                    StoreError::Connection("refused".into())
                )
            }
        );
        assert_eq!(
            classifier.classify(&CheckFailure::NotOwner.into(), &cmd),
            Outcome::Notice("This command can **only** be used by the **server owner**.".into())
        );
    }
}
