//! # repo-compose CLI
//!
//! Binary entry point for the `repo-compose` command-line tool. The binary
//! is a thin wrapper: argument parsing and command dispatch live in `cli`,
//! and the composition logic itself is in the `repo_compose` library crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute().await
}
