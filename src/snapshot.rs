//! # Repository Snapshots
//!
//! A `RepoSnapshot` holds the complete file tree of a single shallow clone
//! at a resolved ref, entirely in memory. Snapshots are built once by the
//! transport (or by tests, from literal files) and never modified afterward,
//! which is what lets the writer read them concurrently without locks.
//!
//! The surface mirrors what the composition engine needs from a repository:
//! a sorted file list, glob matching against full relative paths, `stat` for
//! file modes, and content reads.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::path;

/// File metadata exposed by [`RepoSnapshot::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Unix permission bits (e.g. `0o644`, `0o755`).
    pub mode: u32,
    /// Content size in bytes.
    pub size: u64,
}

#[derive(Debug, Clone)]
struct FileEntry {
    content: Vec<u8>,
    mode: u32,
}

/// An immutable in-memory file tree of one repository at one ref.
///
/// # Examples
///
/// ```
/// use repo_compose::snapshot::RepoSnapshot;
///
/// let mut snap = RepoSnapshot::new("https://example.com/repo.git", "main");
/// snap.add_file("README.md", "# hi");
/// snap.add_file("src/lib.rs", "pub fn lib() {}");
///
/// assert_eq!(snap.file_list(), vec!["README.md", "src/lib.rs"]);
/// assert_eq!(snap.glob("src/*.rs").unwrap(), vec!["src/lib.rs"]);
/// assert_eq!(snap.read("README.md").unwrap(), b"# hi");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RepoSnapshot {
    url: String,
    reference: String,
    files: BTreeMap<String, FileEntry>,
}

impl RepoSnapshot {
    /// Create an empty snapshot for the given locator and resolved ref.
    pub fn new(url: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reference: reference.into(),
            files: BTreeMap::new(),
        }
    }

    /// Load a snapshot from a cloned working tree on disk.
    ///
    /// The `.git` directory is skipped; everything else is read into memory
    /// with its permission bits.
    pub fn from_dir(url: &str, reference: &str, root: &Path) -> Result<Self> {
        let mut snapshot = Self::new(url, reference);
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git")
        {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir yields paths under root");
            let name = relative.to_string_lossy().replace('\\', "/");
            let content = std::fs::read(entry.path())?;
            let mode = file_mode(&entry.metadata().map_err(|e| Error::Io(e.into()))?);
            snapshot.files.insert(name, FileEntry { content, mode });
        }
        Ok(snapshot)
    }

    /// Add a file with default permissions. Only used while building a
    /// snapshot; once shared, a snapshot is never mutated.
    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.add_file_with_mode(name, content, 0o644);
    }

    /// Add a file with explicit permission bits.
    pub fn add_file_with_mode(
        &mut self,
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mode: u32,
    ) {
        self.files.insert(
            name.into(),
            FileEntry {
                content: content.into(),
                mode,
            },
        );
    }

    /// The repository locator this snapshot was cloned from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The resolved branch or tag name this snapshot was cloned at.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Sorted list of every file in the snapshot.
    pub fn file_list(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sorted list of file names matching the given glob pattern.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = path::glob(pattern)?;
        Ok(self
            .files
            .keys()
            .filter(|name| matcher.is_match(name))
            .cloned()
            .collect())
    }

    /// File metadata for a single file.
    pub fn stat(&self, name: &str) -> Result<FileStat> {
        let entry = self.entry(name)?;
        Ok(FileStat {
            mode: entry.mode,
            size: entry.content.len() as u64,
        })
    }

    /// A reader over the file's content.
    pub fn open(&self, name: &str) -> Result<impl Read + '_> {
        Ok(Cursor::new(self.entry(name)?.content.as_slice()))
    }

    /// The whole content of a single file.
    pub fn read(&self, name: &str) -> Result<&[u8]> {
        Ok(self.entry(name)?.content.as_slice())
    }

    fn entry(&self, name: &str) -> Result<&FileEntry> {
        self.files.get(name).ok_or_else(|| Error::FileNotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
