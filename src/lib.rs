//! # repo-compose
//!
//! This library composes a repository's file tree from itself plus an
//! inheritance chain of upstream repositories. A repository declares its
//! upstreams and selection rules in a `.commonrepo.yaml` manifest; upstreams
//! may declare upstreams of their own, forming a rooted DAG. Each node
//! contributes files filtered by include/exclude globs, optionally rewritten
//! by rename rules, and optionally rendered as templates against a merged
//! variable map.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use repo_compose::config::Manifest;
//! use repo_compose::snapshot::RepoSnapshot;
//! use repo_compose::targets::TargetSet;
//!
//! // A snapshot is the in-memory tree of one cloned repository.
//! let mut snap = RepoSnapshot::new("https://example.com/repo.git", "main");
//! snap.add_file("README.md", "# My Project");
//! snap.add_file("src/main.rs", "fn main() {}");
//!
//! // Its target set starts as the identity mapping and is shaped by the
//! // manifest's filter pipeline.
//! let manifest = Manifest::parse("include: ['src/**']\n").unwrap();
//! let mut targets = TargetSet::identity(Arc::new(snap));
//! targets
//!     .apply_manifest(&manifest, &Arc::new(Default::default()))
//!     .unwrap();
//!
//! assert_eq!(targets.sorted_paths(), vec!["src/main.rs"]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Manifest (`config`)**: the parsed declarative config of a node -
//!   include/exclude/template globs, rename rules, template variables, and
//!   the upstream edges to inherit from.
//! - **Snapshot (`snapshot`)**: an immutable in-memory shallow clone at a
//!   resolved ref, exposing glob, stat, open and read.
//! - **Targets (`targets`)**: a per-repository mapping from output path to
//!   target descriptor, shaped by the filter pipeline in its fixed order:
//!   includes, templates, excludes, renames.
//! - **Composition (`compose`)**: the recursive parallel upstream loader,
//!   the post-order flattener that propagates edge rules, and the fold of
//!   every node's targets into a single output mapping where the last
//!   writer wins.
//! - **Writer (`write`)**: bounded-parallel materialization of the output
//!   mapping onto a real filesystem.
//! - **Transport (`git`)**: the "fetch a snapshot at a ref" contract and
//!   its git CLI implementation.
//!
//! ## Execution Flow
//!
//! The [`compose::Composer`] facade runs the whole pipeline: load the root
//! repository, recursively clone its upstream tree (bounded depth, parallel,
//! error-accumulating), flatten the tree into application order, filter
//! every node's target set, and fold the results into an
//! [`compose::OutputMap`] ready for [`write::write_output`].

pub mod compose;
pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod path;
pub mod snapshot;
pub mod targets;
pub mod template;
pub mod write;
