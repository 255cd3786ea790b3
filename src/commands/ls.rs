//! The `ls` command: show what the composition would produce, without
//! writing anything.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use repo_compose::compose::Composer;
use repo_compose::defaults;
use repo_compose::git::{self, GitCli};

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Maximum upstream recursion depth
    #[arg(long, value_name = "N", default_value_t = defaults::MAX_UPSTREAM_DEPTH)]
    pub max_depth: usize,

    /// Mark template outputs with a trailing marker
    #[arg(long)]
    pub mark_templates: bool,
}

pub async fn execute(args: LsArgs) -> Result<()> {
    let root = git::find_repo_root().context("resolving repository root")?;

    let composer = Composer::new(Arc::new(GitCli::new())).with_max_depth(args.max_depth);
    let output = composer.compose(&root.to_string_lossy(), "").await?;

    let mut paths: Vec<&String> = output.keys().collect();
    paths.sort();
    for path in paths {
        if args.mark_templates && output[path].is_template() {
            println!("{} (template)", path);
        } else {
            println!("{}", path);
        }
    }
    Ok(())
}
