//! Text commands.
//!
//! A command line is tokenized with [`tokenize`], resolved against a
//! [`CommandTable`], and its remaining tokens are bound to the resolved
//! command's [`Parameter`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use shardline_framework::command::{Command, Converter, Parameter};
//!
//! let echo = Command::new("echo")
//!     .alias("say")
//!     .param(Parameter::keyword_only("text"))
//!     .handler(|inv: Invocation| async move {
//!         let text = inv.args.str("text").unwrap_or_default().to_string();
//!         inv.reply(&text).await?;
//!         Ok(())
//!     })
//!     .build();
//! table.add(echo);
//! ```

mod convert;
mod node;
mod param;
mod split;
mod table;

pub use convert::{ConvertFn, Converter, DeferredConverter, EntityConverter};
pub use node::{Command, CommandHandler, CommandNode, Invocation};
pub use param::{Arg, BoundArgs, ParamKind, Parameter, bind};
pub use split::{shell_split, tokenize};
pub use table::{CommandTable, Resolved};
