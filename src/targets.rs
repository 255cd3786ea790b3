//! # Targets and the Filter Pipeline
//!
//! A `Target` describes one entry of the composed output: the source file it
//! comes from, whether it is copied verbatim or rendered as a template, and
//! which snapshot its bytes live in. A `TargetSet` is a repository's mutable
//! mapping from *output path* to `Target`, born as the identity mapping (one
//! entry per source file under its own name).
//!
//! The filter pipeline mutates a `TargetSet` in a fixed, user-visible order:
//!
//! 1. **includes** - an empty include list clears the set; otherwise the set
//!    is replaced by the union of all include matches, in order.
//! 2. **templates** - template globs match the snapshot's *source* file
//!    list, not the current output paths, so templates reintroduce files the
//!    include filter dropped.
//! 3. **excludes** - matching entries are removed; a glob matching nothing
//!    is not an error.
//! 4. **renames** - each rule walks a freshly sorted snapshot of the current
//!    key set, so later rules can rename the results of earlier ones and the
//!    outcome is deterministic. When two keys collide on one new name, the
//!    last writer in sorted order wins.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Manifest, RenameRule, TemplateVars};
use crate::error::Result;
use crate::snapshot::{FileStat, RepoSnapshot};
use crate::{path, template};

/// How a target's content is produced.
#[derive(Debug, Clone)]
pub enum TargetKind {
    /// Byte-for-byte copy of the source file.
    Plain,
    /// Render the source file as a template against the merged variables.
    Template(Arc<TemplateVars>),
}

/// A single output entry: source name, render policy, and the snapshot that
/// holds the bytes.
#[derive(Debug, Clone)]
pub struct Target {
    /// Source path within the owning snapshot.
    pub name: String,
    /// Copy verbatim or render as a template.
    pub kind: TargetKind,
    snapshot: Arc<RepoSnapshot>,
}

impl Target {
    fn plain(name: &str, snapshot: Arc<RepoSnapshot>) -> Self {
        Self {
            name: name.to_string(),
            kind: TargetKind::Plain,
            snapshot,
        }
    }

    fn template(name: &str, snapshot: Arc<RepoSnapshot>, vars: Arc<TemplateVars>) -> Self {
        Self {
            name: name.to_string(),
            kind: TargetKind::Template(vars),
            snapshot,
        }
    }

    /// The snapshot this target reads from.
    pub fn snapshot(&self) -> &RepoSnapshot {
        &self.snapshot
    }

    pub fn is_template(&self) -> bool {
        matches!(self.kind, TargetKind::Template(_))
    }

    /// Source file metadata, used by the writer for permission bits.
    pub fn stat(&self) -> Result<FileStat> {
        self.snapshot.stat(&self.name)
    }

    /// Produce the bytes to write: the source content verbatim for plain
    /// targets, the rendered output for template targets.
    pub fn content(&self) -> Result<Cow<'_, [u8]>> {
        let raw = self.snapshot.read(&self.name)?;
        match &self.kind {
            TargetKind::Plain => Ok(Cow::Borrowed(raw)),
            TargetKind::Template(vars) => {
                let source =
                    std::str::from_utf8(raw).map_err(|_| crate::error::Error::Template {
                        name: self.name.clone(),
                        message: "template is not valid UTF-8".to_string(),
                    })?;
                Ok(Cow::Owned(
                    template::render(&self.name, source, vars)?.into_bytes(),
                ))
            }
        }
    }
}

/// A repository's mutable mapping from output path to [`Target`].
#[derive(Debug, Clone)]
pub struct TargetSet {
    snapshot: Arc<RepoSnapshot>,
    entries: HashMap<String, Target>,
}

impl TargetSet {
    /// Create the identity mapping: every source file under its own name,
    /// marked for plain copy.
    pub fn identity(snapshot: Arc<RepoSnapshot>) -> Self {
        let mut set = Self {
            snapshot,
            entries: HashMap::new(),
        };
        set.reset();
        set
    }

    /// Restore the identity mapping. Idempotent.
    pub fn reset(&mut self) {
        let snapshot = self.snapshot.clone();
        self.entries = snapshot
            .file_list()
            .into_iter()
            .map(|name| (name.to_string(), Target::plain(name, snapshot.clone())))
            .collect();
    }

    /// Read-only view of the current mapping.
    pub fn entries(&self) -> &HashMap<String, Target> {
        &self.entries
    }

    pub fn get(&self, output_path: &str) -> Option<&Target> {
        self.entries.get(output_path)
    }

    pub fn contains(&self, output_path: &str) -> bool {
        self.entries.contains_key(output_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current output paths in sorted order.
    pub fn sorted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Sorted output paths matching the given glob.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = path::glob(pattern)?;
        let mut matches: Vec<String> = self
            .entries
            .keys()
            .filter(|name| matcher.is_match(name))
            .cloned()
            .collect();
        matches.sort();
        Ok(matches)
    }

    /// Run the full filter pipeline for one manifest, in the fixed order
    /// includes, templates, excludes, renames.
    pub fn apply_manifest(&mut self, manifest: &Manifest, vars: &Arc<TemplateVars>) -> Result<()> {
        self.apply_includes(&manifest.include)?;
        self.apply_templates(&manifest.template, vars)?;
        self.apply_excludes(&manifest.exclude)?;
        self.apply_renames(&manifest.rename);
        Ok(())
    }

    /// Keep only entries whose output path matches at least one include
    /// glob. An empty include list clears the set entirely.
    pub fn apply_includes(&mut self, includes: &[String]) -> Result<()> {
        if includes.is_empty() {
            self.entries.clear();
            return Ok(());
        }

        let mut found = HashMap::with_capacity(self.entries.len());
        for include in includes {
            let matcher = path::glob(include)?;
            for (name, target) in &self.entries {
                if matcher.is_match(name) {
                    found.insert(name.clone(), target.clone());
                }
            }
        }
        self.entries = found;
        Ok(())
    }

    /// Insert (or overwrite) a template target for every *source* file
    /// matching a template glob, regardless of what includes and excludes
    /// did before.
    pub fn apply_templates(&mut self, templates: &[String], vars: &Arc<TemplateVars>) -> Result<()> {
        for pattern in templates {
            for name in self.snapshot.glob(pattern)? {
                let target = Target::template(&name, self.snapshot.clone(), vars.clone());
                self.entries.insert(name, target);
            }
        }
        Ok(())
    }

    /// Remove every entry whose output path matches an exclude glob.
    pub fn apply_excludes(&mut self, excludes: &[String]) -> Result<()> {
        if excludes.is_empty() {
            return Ok(());
        }
        for exclude in excludes {
            let matcher = path::glob(exclude)?;
            self.entries.retain(|name, _| !matcher.is_match(name));
        }
        Ok(())
    }

    /// Apply rename rules in order.
    ///
    /// Each rule iterates a sorted snapshot of the key set taken when the
    /// rule starts, never the map it is mutating. An application yielding
    /// the empty string or the unchanged path leaves the entry in place.
    pub fn apply_renames(&mut self, renames: &[RenameRule]) {
        if renames.is_empty() || self.entries.is_empty() {
            return;
        }

        for rename in renames {
            let mut names: Vec<String> = self.entries.keys().cloned().collect();
            names.sort();
            for name in names {
                if !rename.matches(&name) {
                    continue;
                }
                let renamed = rename.apply(&name);
                if renamed.is_empty() || renamed == name {
                    continue;
                }
                if let Some(target) = self.entries.remove(&name) {
                    self.entries.insert(renamed, target);
                }
            }
        }
    }

    /// Consume the set, yielding its entries for the compositor's fold.
    pub fn into_entries(self) -> HashMap<String, Target> {
        self.entries
    }
}
