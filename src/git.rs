//! # Git Transport
//!
//! The composition core treats git as a black box that can produce a
//! repository snapshot at a ref. That contract is the [`Transport`] trait;
//! [`GitCli`] implements it by shelling out to the `git` binary, which keeps
//! authentication, proxies and SSH agents working exactly as they do for the
//! user's normal git usage.
//!
//! Fetching a snapshot:
//!
//! 1. Rewrite the URL through any locally configured `insteadOf` rules
//!    (longest matching prefix wins, per git's own semantics).
//! 2. Resolve an empty ref to the remote's default branch by asking for the
//!    symbolic HEAD.
//! 3. Shallow-clone (depth 1, single branch) into a temporary directory and
//!    slurp the working tree into an in-memory [`RepoSnapshot`].

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::snapshot::RepoSnapshot;

/// Black-box "fetch repository snapshot at ref" service.
///
/// The loader and CLI only ever talk to this trait, which is what lets the
/// integration tests swap in an in-memory fixture transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a snapshot of `url` at `reference`; an empty reference means
    /// the remote's default branch.
    async fn fetch(&self, url: &str, reference: &str) -> Result<RepoSnapshot>;
}

/// Transport implementation backed by the `git` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn git(args: &[&str]) -> Result<Output> {
        let output = Command::new("git").args(args).output().await?;
        Ok(output)
    }

    /// Apply local `insteadOf` URL rewrite rules to the given URL.
    ///
    /// A missing or empty git configuration is not an error; the URL is
    /// used as-is.
    async fn apply_instead_of(url: &str) -> String {
        let output = match Self::git(&["config", "--get-regexp", r"^url\..*\.insteadof$"]).await {
            Ok(output) if output.status.success() => output,
            _ => {
                debug!("no insteadOf rules configured");
                return url.to_string();
            }
        };
        let rules = parse_instead_of(&String::from_utf8_lossy(&output.stdout));
        rewrite_url(url, &rules)
    }

    /// Ask the remote which branch its HEAD points at.
    async fn default_branch(url: &str) -> Result<String> {
        let output = Self::git(&["ls-remote", "--symref", url, "HEAD"]).await?;
        if !output.status.success() {
            return Err(Error::GitCommand {
                command: "ls-remote --symref".to_string(),
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        parse_symref(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| Error::GitCommand {
            command: "ls-remote --symref".to_string(),
            url: url.to_string(),
            stderr: "no symbolic HEAD in remote response".to_string(),
        })
    }
}

#[async_trait]
impl Transport for GitCli {
    async fn fetch(&self, url: &str, reference: &str) -> Result<RepoSnapshot> {
        let rewritten = Self::apply_instead_of(url).await;
        let resolved = if reference.is_empty() {
            Self::default_branch(&rewritten).await?
        } else {
            reference.to_string()
        };

        let workdir = tempfile::TempDir::new()?;
        let target = workdir.path().to_string_lossy().to_string();
        debug!("cloning {}@{}", rewritten, resolved);
        let output = Self::git(&[
            "clone",
            "--quiet",
            "--depth",
            "1",
            "--single-branch",
            "--branch",
            resolved.as_str(),
            rewritten.as_str(),
            target.as_str(),
        ])
        .await?;
        if !output.status.success() {
            return Err(Error::GitClone {
                url: url.to_string(),
                reference: resolved,
                message: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let owned_url = url.to_string();
        let snapshot = tokio::task::spawn_blocking(move || {
            let snapshot = RepoSnapshot::from_dir(&owned_url, &resolved, workdir.path());
            drop(workdir);
            snapshot
        })
        .await
        .map_err(|err| Error::Task {
            message: err.to_string(),
        })??;
        Ok(snapshot)
    }
}

/// Parse `git config --get-regexp` output into (insteadOf-prefix, base)
/// pairs. Keys look like `url.<base>.insteadof` and the base may itself
/// contain dots, so the suffix is stripped rather than split on.
fn parse_instead_of(config: &str) -> Vec<(String, String)> {
    let mut rules = Vec::new();
    for line in config.lines() {
        let (key, value) = match line.split_once(' ') {
            Some(pair) => pair,
            None => continue,
        };
        let base = match key
            .strip_prefix("url.")
            .and_then(|rest| rest.strip_suffix(".insteadof"))
        {
            Some(base) => base,
            None => continue,
        };
        rules.push((value.to_string(), base.to_string()));
    }
    rules
}

/// Rewrite a URL through the rule whose `insteadOf` prefix is the longest
/// match, mirroring git's own resolution order.
fn rewrite_url(url: &str, rules: &[(String, String)]) -> String {
    let mut best: Option<&(String, String)> = None;
    for rule in rules {
        if !url.starts_with(&rule.0) {
            continue;
        }
        if best.map_or(true, |current| current.0.len() < rule.0.len()) {
            best = Some(rule);
        }
    }
    match best {
        Some((prefix, base)) => format!("{}{}", base, &url[prefix.len()..]),
        None => url.to_string(),
    }
}

/// Pull the branch name out of `ls-remote --symref` output, e.g.
/// `ref: refs/heads/main\tHEAD`.
fn parse_symref(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("ref: ") {
            let full = rest.split('\t').next()?.trim();
            let name = full
                .strip_prefix("refs/heads/")
                .or_else(|| full.strip_prefix("refs/tags/"))
                .unwrap_or(full);
            return Some(name.to_string());
        }
    }
    None
}

/// Walk upward from `start` looking for the directory that contains `.git`.
pub fn detect_git_path(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(".git").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(Error::RepoRoot {
                message: format!(".git not found above {}", start.display()),
            });
        }
    }
}

/// The root of the repository containing the current working directory.
pub fn find_repo_root() -> Result<PathBuf> {
    detect_git_path(&std::env::current_dir()?)
}
