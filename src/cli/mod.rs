//! Command-line interface for site maintenance.
//!
//! Commands operate directly on the database directory, so the server must
//! not have the same site open at the same time.

pub mod args;
pub mod commands;
pub mod utils;

use crate::engine::Engine;
use crate::Result;
use clap::Parser;

pub use args::{Cli, Command};

/// Main entry point for the CLI application
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    execute(&cli)
}

/// Executes a parsed command line.
pub fn execute(cli: &Cli) -> Result<()> {
    let engine = utils::open_engine(&cli.root, cli.command.site())?;

    let result = match &cli.command {
        Command::Export { site, file } => commands::export(&engine, site, file.as_deref()).map(|_| ()),
        Command::Import { site, file } => commands::import(&engine, site, file).map(|_| ()),
        Command::Wipe { site } => commands::wipe(&engine, site),
        Command::DeleteUser { site, user } => commands::delete_user(&engine, site, user),
        Command::Block {
            site,
            user,
            ttl,
            unblock,
        } => commands::block(&engine, site, user, *ttl, !unblock),
    };

    engine.close()?;
    result
}
