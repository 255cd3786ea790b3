//! # CLI Argument Parsing and Command Dispatch
//!
//! Defines the command-line interface for the `repo-compose` tool using
//! `clap`: the global `--debug` flag, the available subcommands, and the
//! dispatch into their implementations under `src/commands/`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

/// Compose a repository from its upstream inheritance chain
#[derive(Parser, Debug)]
#[command(name = "repo-compose")]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compose the upstream chain and write the result into the repository
    Run(commands::run::RunArgs),

    /// List the output paths the composition would produce
    Ls(commands::ls::LsArgs),

    /// Validate the repository's manifest
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Execute the parsed CLI command.
    pub async fn execute(self) -> Result<()> {
        self.init_logger()?;

        match self.command {
            Commands::Run(args) => commands::run::execute(args).await,
            Commands::Ls(args) => commands::ls::execute(args).await,
            Commands::Validate(args) => commands::validate::execute(args),
        }
    }

    /// Initialize the logger. `--debug` or a non-empty `DEBUG` environment
    /// variable raises the filter to debug level.
    fn init_logger(&self) -> Result<()> {
        let debug_env = std::env::var("DEBUG").map(|v| !v.is_empty()).unwrap_or(false);
        let level = if self.debug || debug_env {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp(None)
            .format_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize logger: {}", e))?;

        Ok(())
    }
}
