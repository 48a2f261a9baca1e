//! Poseidon — push local file changes to a connected remote editor.
//!
//! # Usage
//!
//! ```text
//! poseidon [--root <dir>] [-p <port>] [--window-path <path>] [--poll] ...
//! poseidon status [-p <port>] [--json]
//! poseidon -v
//! ```

mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use commands::{serve::ServeArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(
    name = "poseidon",
    version,
    about = "Watch a directory and push changes to a connected remote editor",
    long_about = None,
    disable_version_flag = true,
    args_conflicts_with_subcommands = true,
)]
struct Cli {
    /// Print version.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query a running daemon.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Status(args)) => args.run(),
        None => cli.serve.run(),
    }
}
