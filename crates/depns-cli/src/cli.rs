//! CLI argument definitions for depns.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "depns",
    version,
    about = "Check version requirements and resolve artifact namespaces",
    long_about = "depns evaluates version requirement expressions such as `>=1.0 & <2 | 3.0` \
                  and resolves named artifacts through a tree of project namespaces loaded \
                  from a TOML artifact profile."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check versions against a requirement expression
    Check {
        /// Requirement expression, e.g. "~>1.5 | 2.0"
        requirement: String,
        /// Versions to check
        #[arg(required = true)]
        versions: Vec<String>,
    },

    /// Print the default version a requirement implies
    Default {
        /// Requirement expression
        requirement: String,
    },

    /// Resolve artifact keys through a profile's namespaces
    Resolve {
        /// Artifact profile (TOML)
        #[arg(short, long, env = "DEPNS_PROFILE")]
        profile: PathBuf,
        /// Namespace to resolve from, e.g. "foo:bar" (defaults to root)
        #[arg(short, long)]
        scope: Option<String>,
        /// Print a JSON object instead of lines
        #[arg(long)]
        json: bool,
        /// Names, unversioned specs or sub-namespaces to resolve
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
