//! dropin: directory-driven module launcher.
//!
//! # Usage
//!
//! ```text
//! dropin [--base <dir>] init [--interactive] [--watch-runtime]
//! dropin [--base <dir>] start
//! dropin [--base <dir>] stop
//! dropin [--base <dir>] status [--json]
//! dropin [--base <dir>] stability [--wait] [--json]
//! dropin [--base <dir>] logs [--lines <n>] [--stderr-only]
//! ```
//!
//! The base directory defaults to `$DROPIN_BASE`, then `~/.dropin`.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    daemon::LogsArgs, init::InitArgs, stability::StabilityArgs, status::StatusArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "dropin",
    version,
    about = "Deploy modules and configuration by dropping files into directories",
    long_about = None,
)]
struct Cli {
    /// Launcher base directory.
    #[arg(long, global = true, env = "DROPIN_BASE", value_name = "DIR")]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the directory layout and a default configuration.
    Init(InitArgs),

    /// Run the launcher in the foreground.
    Start,

    /// Ask a running launcher to shut down.
    Stop,

    /// Show modules, watched directories and configurations.
    Status(StatusArgs),

    /// Evaluate the stability checkers.
    Stability(StabilityArgs),

    /// Print recent launcher log lines.
    Logs(LogsArgs),
}

fn base_dir(base: Option<PathBuf>) -> Result<PathBuf> {
    match base {
        Some(base) => Ok(base),
        None => Ok(dirs::home_dir()
            .context("could not determine home directory")?
            .join(".dropin")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = base_dir(cli.base)?;
    match cli.command {
        Commands::Init(args) => args.run(&base),
        Commands::Start => commands::daemon::start(&base),
        Commands::Stop => commands::daemon::stop(&base),
        Commands::Status(args) => args.run(&base),
        Commands::Stability(args) => args.run(&base),
        Commands::Logs(args) => args.run(&base),
    }
}
