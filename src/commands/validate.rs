//! The `validate` command: parse the local manifest and report problems.

use anyhow::{anyhow, Context, Result};
use clap::Args;

use repo_compose::config::Manifest;
use repo_compose::{defaults, git, path};

#[derive(Args, Debug)]
pub struct ValidateArgs {}

pub fn execute(_args: ValidateArgs) -> Result<()> {
    let root = git::find_repo_root().context("resolving repository root")?;
    let pattern = defaults::config_file_glob();
    let matcher = path::glob(&pattern)?;

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if matcher.is_match(&name) {
            matches.push(name);
        }
    }
    matches.sort();
    matches.sort_by_key(String::len);

    let name = matches.first().ok_or_else(|| {
        anyhow!("no manifest matching {} in {}", pattern, root.display())
    })?;
    let text = std::fs::read_to_string(root.join(name))
        .with_context(|| format!("reading {}", name))?;
    let manifest = Manifest::parse(&text).with_context(|| format!("parsing {}", name))?;

    println!(
        "{}: OK ({} upstreams, {} includes, {} excludes, {} renames)",
        name,
        manifest.upstream.len(),
        manifest.include.len(),
        manifest.exclude.len(),
        manifest.rename.len(),
    );
    Ok(())
}
