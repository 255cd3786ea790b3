//! The `run` command: compose the upstream chain and materialize it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use log::{debug, info};

use repo_compose::compose::Composer;
use repo_compose::defaults;
use repo_compose::git::{self, GitCli};
use repo_compose::write;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Maximum upstream recursion depth
    #[arg(long, value_name = "N", default_value_t = defaults::MAX_UPSTREAM_DEPTH)]
    pub max_depth: usize,

    /// Write into this directory instead of the repository root
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let root = git::find_repo_root().context("resolving repository root")?;
    let base = args.output.unwrap_or_else(|| root.clone());
    info!("composing {}", root.display());

    let composer = Composer::new(Arc::new(GitCli::new())).with_max_depth(args.max_depth);
    let output = composer.compose(&root.to_string_lossy(), "").await?;
    debug!("composed {} output entries", output.len());

    write::write_output(&output, &base).await?;
    info!("wrote {} files to {}", output.len(), base.display());
    Ok(())
}
