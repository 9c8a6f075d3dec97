// grove/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use grove_common::config::Config;
use grove_common::error::Result;

pub mod lock;
pub mod resolve;

use crate::cli::lock::LockArgs;
use crate::cli::resolve::ResolveArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "grove", bin_name = "grove")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the workspace and print the package graph
    Resolve(ResolveArgs),
    /// Update or verify the lockfile
    Lock(LockArgs),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Resolve(command) => command.run(config).await,
            Self::Lock(command) => command.run(config).await,
        }
    }
}
