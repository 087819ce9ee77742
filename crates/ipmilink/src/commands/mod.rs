//! Command dispatch: bridges CLI args to handlers and output formatting.

pub mod address;
pub mod config_cmd;
pub mod inventory;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a parsed command to its handler. Every command runs offline.
pub fn dispatch(cmd: &Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Address(args) => address::handle(args, global),
        Command::Inventory(args) => inventory::handle(args, global),
        Command::Config(args) => config_cmd::handle(args, global),
    }
}
