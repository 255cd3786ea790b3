//! # Materializing the Output
//!
//! The writer sinks a composed [`OutputMap`] into a real directory tree.
//! Entries are written by a bounded pool of concurrent tasks; parent
//! directory creation is the one operation serialized under a lock, because
//! filesystems dislike concurrent `mkdir -p` over shared prefixes.
//!
//! Each entry is created (or truncated) with the permission bits of its
//! source file, then receives either the source bytes verbatim or the
//! rendered template output. Failures never abort the run early: every
//! entry gets its attempt, and the accumulated failures come back as one
//! combined error.

use std::path::Path;

use futures::stream::{self, StreamExt};
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::compose::OutputMap;
use crate::defaults;
use crate::error::{Error, ErrorSink, Result};
use crate::path::clean_join;
use crate::targets::Target;

/// Write every entry of `output` beneath `base`.
pub async fn write_output(output: &OutputMap, base: &Path) -> Result<()> {
    let mkdir = Mutex::new(());
    let sink = ErrorSink::new();

    let mut writes = stream::iter(output.iter())
        .map(|(name, target)| {
            let sink = sink.clone();
            let mkdir = &mkdir;
            async move {
                if let Err(err) = write_entry(base, name, target, mkdir).await {
                    sink.push(err);
                }
            }
        })
        .buffer_unordered(defaults::WRITE_CONCURRENCY);
    while writes.next().await.is_some() {}
    drop(writes);

    sink.into_result()
}

async fn write_entry(base: &Path, name: &str, target: &Target, mkdir: &Mutex<()>) -> Result<()> {
    let full = clean_join(base, name);
    debug!("writing {}", full.display());

    if let Some(parent) = full.parent() {
        let _guard = mkdir.lock().await;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| Error::Write {
                path: name.to_string(),
                message: format!("creating {}: {}", parent.display(), err),
            })?;
    }

    let stat = target.stat()?;
    let content = target.content()?;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(stat.mode);

    let mut file = options.open(&full).await.map_err(|err| Error::Write {
        path: name.to_string(),
        message: format!("opening {}: {}", full.display(), err),
    })?;
    file.write_all(&content).await.map_err(|err| Error::Write {
        path: name.to_string(),
        message: format!("writing {}: {}", full.display(), err),
    })?;
    file.shutdown().await.map_err(|err| Error::Write {
        path: name.to_string(),
        message: format!("writing {}: {}", full.display(), err),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::snapshot::RepoSnapshot;
    use crate::targets::TargetSet;

    fn output_from(files: &[(&str, &str)], templates: &[&str], vars: &str) -> OutputMap {
        let mut snap = RepoSnapshot::new("fixture", "main");
        for (name, content) in files {
            snap.add_file(*name, *content);
        }
        let mut set = TargetSet::identity(Arc::new(snap));
        let vars: BTreeMap<String, serde_yaml::Value> =
            serde_yaml::from_str::<Option<BTreeMap<String, serde_yaml::Value>>>(vars)
                .ok()
                .flatten()
                .unwrap_or_default();
        let patterns: Vec<String> = templates.iter().map(|s| s.to_string()).collect();
        set.apply_templates(&patterns, &Arc::new(vars)).unwrap();
        set.into_entries()
    }

    #[tokio::test]
    async fn test_writes_nested_tree() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = output_from(
            &[("a.txt", "A"), ("deep/dir/b.txt", "B")],
            &[],
            "",
        );
        write_output(&output, tmp.path()).await.unwrap();

        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "A");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("deep/dir/b.txt")).unwrap(),
            "B"
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_preserves_source_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let mut snap = RepoSnapshot::new("fixture", "main");
        snap.add_file_with_mode("run.sh", "#!/bin/sh\n", 0o755);
        let set = TargetSet::identity(Arc::new(snap));
        write_output(&set.into_entries(), tmp.path()).await.unwrap();

        let mode = std::fs::metadata(tmp.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_renders_templates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = output_from(
            &[("config.yml", "project: {{.project}}\n")],
            &["config.yml"],
            "project: demo\n",
        );
        write_output(&output, tmp.path()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("config.yml")).unwrap(),
            "project: demo\n"
        );
    }

    #[tokio::test]
    async fn test_render_failure_accumulates_other_writes_land() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = output_from(
            &[("broken.yml", "value: {{.missing}}\n"), ("ok.txt", "fine")],
            &["broken.yml"],
            "",
        );
        let err = write_output(&output, tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("ok.txt")).unwrap(),
            "fine"
        );
        assert!(!tmp.path().join("broken.yml").exists());
    }

    #[tokio::test]
    async fn test_overwrites_existing_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "old contents, longer").unwrap();
        let output = output_from(&[("a.txt", "new")], &[], "");
        write_output(&output, tmp.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_empty_output_is_a_no_op() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_output(&OutputMap::new(), tmp.path()).await.unwrap();
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }
}
