//! Recursive walk of a local directory into upload work items.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::transfer::WorkItem;

/// A regular file found under the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub absolute_path: PathBuf,
    /// Path below the root, `/`-separated on every platform.
    pub relative_path: String,
}

/// Regular files under `root`, sorted by name, without following symlinks.
/// Unreadable entries are logged and skipped.
pub fn walk(root: &Path) -> impl Iterator<Item = LocalEntry> + '_ {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let relative_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some(LocalEntry {
                absolute_path: entry.into_path(),
                relative_path,
            })
        })
}

/// Join a remote prefix and a relative path without a leading `/` when the
/// prefix is empty.
pub fn remote_key(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let relative = relative.trim_start_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Upload work items for every file under `root`, keyed under `prefix`.
pub fn upload_items(root: &Path, prefix: &str) -> Vec<WorkItem> {
    walk(root)
        .map(|e| WorkItem::upload(e.absolute_path, remote_key(prefix, &e.relative_path)))
        .collect()
}
