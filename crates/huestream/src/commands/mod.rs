//! Command dispatch: CLI args -> bridge calls / streaming -> output formatting.

pub mod config_cmd;
pub mod configs;
pub mod discover;
pub mod pair;
pub mod stream;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a bridge-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Discover(args) => discover::handle(args, global).await,
        Command::Pair(args) => pair::handle(args, global).await,
        Command::Configs(args) => configs::handle(args, global).await,
        Command::Stream(args) => stream::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        // Handled in main before dispatch
        Command::Completions(_) => Ok(()),
    }
}
