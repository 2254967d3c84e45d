//! Command-line argument parsing for the maintenance tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Maintenance commands operating directly on the data root.
#[derive(Parser, Debug)]
#[command(name = "remark42")]
#[command(about = "Maintenance tool for remark42 comment databases")]
#[command(version)]
pub struct Cli {
    /// Directory holding one database per site
    #[arg(long, env = "REMARK_DB_ROOT", default_value = "./var")]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Command-line interface commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write all comments of a site as JSON lines
    Export {
        #[arg(long, short)]
        site: String,
        /// Gzipped output file, stdout if omitted
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
    /// Replace all comments of a site from a backup, plain or gzipped
    Import {
        #[arg(long, short)]
        site: String,
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Remove all comments of a site, keeping blocks and flags
    Wipe {
        #[arg(long, short)]
        site: String,
    },
    /// Erase a user's identity from all their comments
    DeleteUser {
        #[arg(long, short)]
        site: String,
        #[arg(long, short)]
        user: String,
    },
    /// Block or unblock a user
    Block {
        #[arg(long, short)]
        site: String,
        #[arg(long, short)]
        user: String,
        /// Block duration in seconds, 0 is permanent
        #[arg(long, default_value_t = 0)]
        ttl: u64,
        /// Lift the block instead
        #[arg(long)]
        unblock: bool,
    },
}

impl Command {
    /// Site the command operates on.
    pub fn site(&self) -> &str {
        match self {
            Command::Export { site, .. }
            | Command::Import { site, .. }
            | Command::Wipe { site }
            | Command::DeleteUser { site, .. }
            | Command::Block { site, .. } => site,
        }
    }
}
