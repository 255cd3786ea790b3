//! Shared test helpers: an in-memory transport serving fixture snapshots.

use std::collections::HashMap;

use async_trait::async_trait;

use repo_compose::error::{Error, Result};
use repo_compose::git::Transport;
use repo_compose::snapshot::RepoSnapshot;

/// A transport that serves snapshots from memory instead of cloning,
/// keyed by repository URL.
#[derive(Default)]
pub struct FixtureTransport {
    repos: HashMap<String, RepoSnapshot>,
}

#[allow(dead_code)]
impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository with default "main" as its resolved ref.
    pub fn add_repo(&mut self, url: &str, files: &[(&str, &str)]) -> &mut Self {
        let mut snap = RepoSnapshot::new(url, "main");
        for (name, content) in files {
            snap.add_file(*name, *content);
        }
        self.repos.insert(url.to_string(), snap);
        self
    }

    /// Register a repository with explicit file modes.
    pub fn add_repo_with_modes(&mut self, url: &str, files: &[(&str, &str, u32)]) -> &mut Self {
        let mut snap = RepoSnapshot::new(url, "main");
        for (name, content, mode) in files {
            snap.add_file_with_mode(*name, *content, *mode);
        }
        self.repos.insert(url.to_string(), snap);
        self
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch(&self, url: &str, reference: &str) -> Result<RepoSnapshot> {
        self.repos
            .get(url)
            .cloned()
            .ok_or_else(|| Error::GitClone {
                url: url.to_string(),
                reference: if reference.is_empty() {
                    "main".to_string()
                } else {
                    reference.to_string()
                },
                message: "repository not found in fixtures".to_string(),
            })
    }
}
