//! Command dispatch and handler modules.

mod check;
mod default;
mod resolve;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Check {
            requirement,
            versions,
        } => check::exec(&requirement, &versions),
        Command::Default { requirement } => default::exec(&requirement),
        Command::Resolve {
            profile,
            scope,
            json,
            keys,
        } => resolve::exec(&profile, scope.as_deref(), json, &keys),
    }
}
